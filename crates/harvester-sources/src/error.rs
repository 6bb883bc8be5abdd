use harvester_core::{FailureKind, ItemError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("rate limited by {url} (retry after {retry_after_secs}s)")]
    RateLimited { url: String, retry_after_secs: u64 },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("API error: {0}")]
    Api(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("{source_name} cannot fetch item {item}")]
    UnsupportedItem {
        source_name: &'static str,
        item: String,
    },
}

impl ItemError for SourceError {
    /// Network trouble and non-2xx answers are routine; everything else means
    /// the remote API or this client behaved in a way nobody planned for.
    fn failure_kind(&self) -> FailureKind {
        match self {
            SourceError::Http(e) if e.is_decode() || e.is_builder() => FailureKind::Unexpected,
            SourceError::Http(_)
            | SourceError::UnexpectedStatus { .. }
            | SourceError::RateLimited { .. } => FailureKind::Request,
            SourceError::Auth(_)
            | SourceError::Deserialize { .. }
            | SourceError::Api(_)
            | SourceError::Stream(_)
            | SourceError::Config(_)
            | SourceError::UnsupportedItem { .. } => FailureKind::Unexpected,
        }
    }
}
