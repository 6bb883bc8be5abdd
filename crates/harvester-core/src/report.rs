//! Run summaries and the sink they are reported to.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{DataSource, Record};

/// Running counters for one batch run.
///
/// Only the orchestrator's fan-in loop touches a tally, so it needs no
/// synchronization. Call [`RunTally::finish`] to freeze it.
#[derive(Debug)]
pub struct RunTally {
    data_source: DataSource,
    logfile: Option<PathBuf>,
    start_time: DateTime<Utc>,
    successful: u64,
    failed: u64,
}

impl RunTally {
    #[must_use]
    pub fn start(data_source: DataSource, logfile: Option<&Path>) -> Self {
        Self::start_at(data_source, logfile, Utc::now())
    }

    #[must_use]
    pub fn start_at(
        data_source: DataSource,
        logfile: Option<&Path>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            data_source,
            logfile: logfile.map(Path::to_path_buf),
            start_time,
            successful: 0,
            failed: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.successful += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    #[must_use]
    pub fn successful(&self) -> u64 {
        self.successful
    }

    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.successful + self.failed
    }

    #[must_use]
    pub fn finish(self) -> RunSummary {
        self.finish_at(Utc::now())
    }

    #[must_use]
    pub fn finish_at(self, end_time: DateTime<Utc>) -> RunSummary {
        #[allow(clippy::cast_precision_loss)]
        let duration_seconds = (end_time - self.start_time)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;
        RunSummary {
            start_time: self.start_time,
            end_time,
            data_source: self.data_source,
            duration_seconds,
            successful_events: self.successful,
            failed_events: self.failed,
            logfile: self.logfile.map(|p| p.display().to_string()),
        }
    }
}

/// Immutable outcome of one batch run, as persisted by a [`JobReportSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub data_source: DataSource,
    pub duration_seconds: f64,
    pub successful_events: u64,
    pub failed_events: u64,
    pub logfile: Option<String>,
}

impl RunSummary {
    #[must_use]
    pub fn total_events(&self) -> u64 {
        self.successful_events + self.failed_events
    }

    /// Flat mapping form of the summary, for sinks that store documents.
    #[must_use]
    pub fn to_record(&self) -> Record {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Record::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to persist run summary: {0}")]
    Persist(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Job-metadata store. Append-only: one `insert` per finished run.
#[async_trait]
pub trait JobReportSink: Send + Sync {
    async fn insert(&self, summary: &RunSummary) -> Result<(), ReportError>;
}
