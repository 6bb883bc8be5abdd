use std::fmt;

use serde::{Deserialize, Serialize};

/// Topic for raw feed documents harvested from the feed index.
pub const RSS_TOPIC: &str = "rss";
/// Topic for discussion submissions (one record per submission).
pub const REDDIT_TOPIC: &str = "reddit";
/// Topic for microblog search results (list of records per query).
pub const TWITTER_TOPIC: &str = "twitter";
/// Topic for live filtered-stream events.
pub const TWITTER_STREAM_TOPIC: &str = "twitter-stream";

/// A structured record: string keys mapped to arbitrarily nested JSON values.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// The external source a run harvests from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Rss,
    Reddit,
    Twitter,
}

impl DataSource {
    /// Broker topic that batch results of this source are published to.
    #[must_use]
    pub fn topic(self) -> &'static str {
        match self {
            DataSource::Rss => RSS_TOPIC,
            DataSource::Reddit => REDDIT_TOPIC,
            DataSource::Twitter => TWITTER_TOPIC,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Rss => "rss",
            DataSource::Reddit => "reddit",
            DataSource::Twitter => "twitter",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One addressable unit of work produced by a source's enumeration step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HarvestItem {
    /// A document URL, e.g. one feed linked from the feed index.
    Url(String),
    /// A discussion submission id.
    Submission(String),
    /// A search query, e.g. one trending topic.
    Query(String),
}

impl fmt::Display for HarvestItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarvestItem::Url(url) => write!(f, "url:{url}"),
            HarvestItem::Submission(id) => write!(f, "submission:{id}"),
            HarvestItem::Query(q) => write!(f, "query:{q}"),
        }
    }
}

/// Normalized content fetched for one item.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw text blob, e.g. a feed XML document.
    Text(String),
    /// A single structured record.
    Record(Record),
    /// A list of structured records.
    Records(Vec<Record>),
}

/// How a per-item failure is classified for logging and counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient and expected: network error, timeout, rate limit, non-2xx.
    Request,
    /// Anything unanticipated, including a panicking worker.
    Unexpected,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Request => f.write_str("request_failure"),
            FailureKind::Unexpected => f.write_str("unexpected_failure"),
        }
    }
}

/// Outcome of processing one [`HarvestItem`].
#[derive(Debug, Clone)]
pub enum HarvestResult {
    Success {
        item: HarvestItem,
        payload: Payload,
    },
    Failure {
        item: HarvestItem,
        kind: FailureKind,
        detail: String,
    },
}

impl HarvestResult {
    #[must_use]
    pub fn item(&self) -> &HarvestItem {
        match self {
            HarvestResult::Success { item, .. } | HarvestResult::Failure { item, .. } => item,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, HarvestResult::Success { .. })
    }
}
