//! Batch mode: enumerate, fetch concurrently, publish as results arrive,
//! report the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use harvester_core::{
    DataSource, HarvestItem, HarvestResult, JobReportSink, RunSummary, RunTally, SourceClient,
};

use crate::broker::Broker;
use crate::error::PipelineError;
use crate::fan_out::FanOut;
use crate::publish::PublishPipeline;

/// Knobs for one batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub max_workers: usize,
    pub request_timeout: Duration,
    /// Log file of this run, recorded in the summary.
    pub logfile: Option<PathBuf>,
}

/// Run one harvesting pass over `source`.
///
/// Every enumerated item ends up counted exactly once: as successful if it
/// was fetched and published, as failed otherwise. The summary is handed to
/// `sink` on a best-effort basis and also returned.
///
/// # Errors
///
/// Returns [`PipelineError::Enumeration`] if the source cannot list its
/// items. A zero-count summary is still reported in that case.
pub async fn run_batch<S, B, K>(
    source: Arc<S>,
    pipeline: &PublishPipeline<B>,
    sink: &K,
    options: &BatchOptions,
) -> Result<RunSummary, PipelineError>
where
    S: SourceClient,
    B: Broker,
    K: JobReportSink + ?Sized,
{
    let data_source = source.data_source();
    let topic = source.topic();
    let mut tally = RunTally::start(data_source, options.logfile.as_deref());
    tracing::info!(%data_source, topic, "harvest run started");

    let items = match source.enumerate().await {
        Ok(items) => items,
        Err(e) => {
            tracing::error!(%data_source, error = %e, "failed to enumerate items");
            insert_best_effort(sink, &tally.finish()).await;
            return Err(PipelineError::Enumeration {
                data_source,
                source: Box::new(e),
            });
        }
    };
    tracing::info!(%data_source, items = items.len(), "enumerated items");

    let worker = {
        let source = Arc::clone(&source);
        move |item: HarvestItem| {
            let source = Arc::clone(&source);
            async move { source.fetch(&item).await }
        }
    };
    let mut fan_out = FanOut::new(items, worker, options.max_workers, options.request_timeout);

    while let Some(result) = fan_out.next().await {
        match result {
            HarvestResult::Success { item, payload } => {
                match pipeline.publish(topic, &payload).await {
                    Ok(messages) => {
                        tally.record_success();
                        tracing::debug!(item = %item, messages, "item published");
                    }
                    Err(e) => {
                        tally.record_failure();
                        tracing::error!(item = %item, error = %e, "failed to publish item");
                    }
                }
            }
            HarvestResult::Failure { .. } => tally.record_failure(),
        }
    }

    let summary = tally.finish();
    insert_best_effort(sink, &summary).await;
    tracing::info!(
        %data_source,
        failed = summary.failed_events,
        duration_seconds = summary.duration_seconds,
        "{}/{} items harvested successfully",
        summary.successful_events,
        summary.total_events()
    );
    Ok(summary)
}

/// Report a run that never got to process anything, e.g. because the broker
/// client could not be created.
pub async fn report_aborted_run<K: JobReportSink + ?Sized>(
    sink: &K,
    data_source: DataSource,
    logfile: Option<&std::path::Path>,
) -> RunSummary {
    let summary = RunTally::start(data_source, logfile).finish();
    insert_best_effort(sink, &summary).await;
    summary
}

async fn insert_best_effort<K: JobReportSink + ?Sized>(sink: &K, summary: &RunSummary) {
    if let Err(e) = sink.insert(summary).await {
        tracing::error!(
            data_source = %summary.data_source,
            error = %e,
            "failed to record run summary"
        );
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
