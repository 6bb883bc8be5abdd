use std::sync::Mutex;

use async_trait::async_trait;
use harvester_core::{FailureKind, ItemError, Payload, Record, ReportError};

use super::*;
use crate::test_support::RecordingBroker;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct FakeError(&'static str);

impl ItemError for FakeError {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Request
    }
}

/// Source with `count` submissions; the one at `slow` never answers in time.
struct FakeSource {
    count: usize,
    slow: Option<usize>,
    enumerate_fails: bool,
}

#[async_trait]
impl SourceClient for FakeSource {
    type Error = FakeError;

    fn data_source(&self) -> DataSource {
        DataSource::Reddit
    }

    async fn enumerate(&self) -> Result<Vec<HarvestItem>, FakeError> {
        if self.enumerate_fails {
            return Err(FakeError("listing unavailable"));
        }
        Ok((1..=self.count)
            .map(|i| HarvestItem::Submission(i.to_string()))
            .collect())
    }

    async fn fetch(&self, item: &HarvestItem) -> Result<Payload, FakeError> {
        let HarvestItem::Submission(id) = item else {
            return Err(FakeError("wrong item"));
        };
        if self.slow.map(|n| n.to_string()).as_deref() == Some(id.as_str()) {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
        }
        let mut record = Record::new();
        record.insert("id".into(), id.clone().into());
        Ok(Payload::Record(record))
    }
}

#[derive(Default)]
struct MemorySink {
    summaries: Mutex<Vec<RunSummary>>,
    fail: bool,
}

#[async_trait]
impl JobReportSink for MemorySink {
    async fn insert(&self, summary: &RunSummary) -> Result<(), ReportError> {
        if self.fail {
            return Err(ReportError::Persist("database is down".into()));
        }
        self.summaries.lock().unwrap().push(summary.clone());
        Ok(())
    }
}

fn options() -> BatchOptions {
    BatchOptions {
        max_workers: 20,
        request_timeout: Duration::from_secs(5),
        logfile: Some(PathBuf::from("logs/reddit_2024-03-09.log")),
    }
}

#[tokio::test(start_paused = true)]
async fn timed_out_item_is_counted_as_failed_and_others_published() {
    let source = Arc::new(FakeSource {
        count: 5,
        slow: Some(3),
        enumerate_fails: false,
    });
    let broker = Arc::new(RecordingBroker::default());
    let pipeline = PublishPipeline::new(Arc::clone(&broker));
    let sink = MemorySink::default();

    let summary = run_batch(source, &pipeline, &sink, &options()).await.unwrap();

    assert_eq!(summary.successful_events, 4);
    assert_eq!(summary.failed_events, 1);
    assert_eq!(summary.data_source, DataSource::Reddit);
    assert_eq!(summary.logfile.as_deref(), Some("logs/reddit_2024-03-09.log"));

    let sent = broker.sent();
    assert_eq!(sent.len(), 4);
    assert!(sent.iter().all(|m| m.topic == "reddit"));
    assert!(sent.iter().all(|m| m.body["id"] != "3"));

    let stored = sink.summaries.lock().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], summary);
}

#[tokio::test]
async fn enumeration_failure_reports_zero_counts() {
    let source = Arc::new(FakeSource {
        count: 5,
        slow: None,
        enumerate_fails: true,
    });
    let broker = Arc::new(RecordingBroker::default());
    let pipeline = PublishPipeline::new(Arc::clone(&broker));
    let sink = MemorySink::default();

    let err = run_batch(source, &pipeline, &sink, &options()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Enumeration {
            data_source: DataSource::Reddit,
            ..
        }
    ));

    let stored = sink.summaries.lock().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].total_events(), 0);
    assert!(broker.sent().is_empty());
}

#[tokio::test]
async fn publish_failures_count_as_failed() {
    let source = Arc::new(FakeSource {
        count: 3,
        slow: None,
        enumerate_fails: false,
    });
    let pipeline = PublishPipeline::new(Arc::new(RecordingBroker::failing()));
    let sink = MemorySink::default();

    let summary = run_batch(source, &pipeline, &sink, &options()).await.unwrap();
    assert_eq!(summary.successful_events, 0);
    assert_eq!(summary.failed_events, 3);
}

#[tokio::test]
async fn empty_enumeration_is_a_successful_empty_run() {
    let source = Arc::new(FakeSource {
        count: 0,
        slow: None,
        enumerate_fails: false,
    });
    let pipeline = PublishPipeline::new(Arc::new(RecordingBroker::default()));
    let sink = MemorySink::default();

    let summary = run_batch(source, &pipeline, &sink, &options()).await.unwrap();
    assert_eq!(summary.total_events(), 0);
    assert_eq!(sink.summaries.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn sink_failure_does_not_fail_the_run() {
    let source = Arc::new(FakeSource {
        count: 2,
        slow: None,
        enumerate_fails: false,
    });
    let pipeline = PublishPipeline::new(Arc::new(RecordingBroker::default()));
    let sink = MemorySink {
        fail: true,
        ..MemorySink::default()
    };

    let summary = run_batch(source, &pipeline, &sink, &options()).await.unwrap();
    assert_eq!(summary.successful_events, 2);
}

#[tokio::test]
async fn aborted_run_is_reported_with_zero_counts() {
    let sink = MemorySink::default();
    let summary = report_aborted_run(&sink, DataSource::Rss, None).await;
    assert_eq!(summary.total_events(), 0);
    assert_eq!(sink.summaries.lock().unwrap()[0].data_source, DataSource::Rss);
}
