use async_trait::async_trait;
use harvester_core::{JobReportSink, ReportError, RunSummary};

/// Sink used when no database is configured: the summary goes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReportSink;

#[async_trait]
impl JobReportSink for TracingReportSink {
    async fn insert(&self, summary: &RunSummary) -> Result<(), ReportError> {
        tracing::info!(
            data_source = %summary.data_source,
            start_time = %summary.start_time.to_rfc3339(),
            end_time = %summary.end_time.to_rfc3339(),
            duration_seconds = summary.duration_seconds,
            successful_events = summary.successful_events,
            failed_events = summary.failed_events,
            logfile = summary.logfile.as_deref().unwrap_or(""),
            "job run report"
        );
        Ok(())
    }
}
