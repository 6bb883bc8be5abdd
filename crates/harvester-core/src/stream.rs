//! Contracts for trend-driven live streaming.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::Record;

/// One active filter on the streaming subscription, tagged with the trend it
/// was created for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub id: String,
    pub value: String,
    #[serde(default)]
    pub tag: String,
}

/// A filter rule that has not been registered yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRule {
    pub value: String,
    pub tag: String,
}

impl NewRule {
    /// Build the match expression for a trending topic: original posts only,
    /// English only.
    #[must_use]
    pub fn for_trend(trend: &str) -> Self {
        Self {
            value: format!("{trend} -is:retweet -is:reply -is:nullcast lang:en"),
            tag: trend.to_string(),
        }
    }
}

/// One inbound item from the live subscription.
///
/// `tag` is the matching rule's tag as reported by the transport, so a
/// consumer never has to look it up against a rule set that may be mid-update.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub record: Record,
    pub tag: Option<String>,
}

/// Source of the currently trending topics for a geographic scope.
#[async_trait]
pub trait TrendSource: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Trending topic names for a Yahoo "where on earth" id.
    async fn current_trends(&self, woeid: i64) -> Result<Vec<String>, Self::Error>;
}

/// Remote store of the subscription's filter rules.
#[async_trait]
pub trait RuleStore: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn list_rules(&self) -> Result<Vec<FilterRule>, Self::Error>;

    async fn delete_rules(&self, ids: &[String]) -> Result<(), Self::Error>;

    /// Register rules and return them with their assigned ids.
    async fn add_rules(&self, rules: &[NewRule]) -> Result<Vec<FilterRule>, Self::Error>;
}

/// A live subscription that pushes inbound events onto a channel.
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect and forward events until the stream ends, the receiver is
    /// dropped, or `shutdown` fires.
    ///
    /// Returns `Ok(())` on a clean stop and `Err` when the connection failed
    /// or was dropped by the server.
    async fn run(
        &self,
        events: mpsc::Sender<StreamEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), Self::Error>;
}
