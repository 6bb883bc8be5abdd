use thiserror::Error;

use crate::broker::BrokerError;

/// A payload could not be turned into broker messages, or the broker refused
/// them.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("cannot parse feed document for topic {topic}: {reason}")]
    Feed { topic: String, reason: String },

    #[error("topic {topic} does not accept a {payload} payload")]
    PayloadShape {
        topic: String,
        payload: &'static str,
    },

    #[error("failed to serialize message body: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Fatal batch-run errors. Per-item failures never end up here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("enumerating {data_source} items failed: {source}")]
    Enumeration {
        data_source: harvester_core::DataSource,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// A reconciliation pass could not bring the remote rule set in line.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to {action} stream rules: {source}")]
    Rules {
        action: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
