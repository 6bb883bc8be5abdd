//! Keeps the live subscription's filter rules in line with what is trending.
//!
//! Each pass refreshes the trend list and then edits the remote rule set so
//! that exactly one rule exists per trending topic. The latest trends, the
//! active rules and the reconciler state are published through `watch`
//! channels; every value is replaced as a whole, so a reader never sees a
//! half-applied pass.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use harvester_core::{FilterRule, NewRule, RuleStore, TrendSource};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::ReconcileError;

/// The current trending topics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrendSet {
    pub topics: Vec<String>,
    /// `None` until the first successful refresh.
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// The rules active on the subscription after the latest pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    pub rules: Vec<FilterRule>,
}

impl RuleSet {
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.tag.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Idle,
    Refreshing,
    Reconciling,
    Stopped,
}

/// What one pass changed on the remote rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Ids of the deleted rules.
    pub removed: Vec<String>,
    /// Tags of the added rules.
    pub added: Vec<String>,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Rule edits needed to turn `active` into one rule per candidate.
///
/// Rules whose tag is still a candidate are kept (the first one per tag);
/// rules with stale or duplicate tags are deleted; candidates without a kept
/// rule are added. Candidate order is preserved and duplicates are ignored.
pub(crate) fn plan(
    active: &[FilterRule],
    candidates: &[String],
) -> (Vec<FilterRule>, Vec<String>, Vec<NewRule>) {
    let wanted: HashSet<&str> = candidates.iter().map(String::as_str).collect();
    let mut kept_tags: HashSet<&str> = HashSet::new();
    let mut kept = Vec::new();
    let mut to_delete = Vec::new();

    for rule in active {
        if wanted.contains(rule.tag.as_str()) && kept_tags.insert(rule.tag.as_str()) {
            kept.push(rule.clone());
        } else {
            to_delete.push(rule.id.clone());
        }
    }

    let mut to_add = Vec::new();
    for candidate in candidates {
        if kept_tags.insert(candidate.as_str()) {
            to_add.push(NewRule::for_trend(candidate));
        }
    }

    (kept, to_delete, to_add)
}

/// Periodically reconciles the subscription's rules against current trends.
pub struct TrendReconciler<T, R> {
    trend_source: Arc<T>,
    rule_store: Arc<R>,
    woeid: i64,
    interval: Duration,
    trends: watch::Sender<Arc<TrendSet>>,
    rules: watch::Sender<Arc<RuleSet>>,
    state: watch::Sender<ReconcilerState>,
}

impl<T: TrendSource, R: RuleStore> TrendReconciler<T, R> {
    pub fn new(trend_source: Arc<T>, rule_store: Arc<R>, woeid: i64, interval: Duration) -> Self {
        Self {
            trend_source,
            rule_store,
            woeid,
            interval,
            trends: watch::channel(Arc::new(TrendSet::default())).0,
            rules: watch::channel(Arc::new(RuleSet::default())).0,
            state: watch::channel(ReconcilerState::Idle).0,
        }
    }

    pub fn subscribe_trends(&self) -> watch::Receiver<Arc<TrendSet>> {
        self.trends.subscribe()
    }

    pub fn subscribe_rules(&self) -> watch::Receiver<Arc<RuleSet>> {
        self.rules.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ReconcilerState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> ReconcilerState {
        *self.state.borrow()
    }

    /// Refresh trends and bring the remote rules in line with them.
    ///
    /// A failed trend refresh keeps the previous trend set; if there has
    /// never been a successful refresh the pass stops there, so an outage
    /// on startup does not wipe rules that are already registered.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] if listing, deleting or adding rules fails.
    /// The active rule snapshot is left untouched in that case.
    pub async fn reconcile_once(&self) -> Result<ReconcileOutcome, ReconcileError> {
        if self.state() == ReconcilerState::Stopped {
            return Ok(ReconcileOutcome::default());
        }

        self.state.send_replace(ReconcilerState::Refreshing);
        self.refresh().await;
        let trends = Arc::clone(&self.trends.borrow());
        if trends.refreshed_at.is_none() {
            self.state.send_replace(ReconcilerState::Idle);
            return Ok(ReconcileOutcome::default());
        }

        self.state.send_replace(ReconcilerState::Reconciling);
        let result = self.apply(&trends.topics).await;
        self.state.send_replace(ReconcilerState::Idle);
        result
    }

    async fn refresh(&self) {
        match self.trend_source.current_trends(self.woeid).await {
            Ok(topics) => {
                let mut seen = HashSet::new();
                let topics: Vec<String> = topics
                    .into_iter()
                    .filter(|topic| seen.insert(topic.clone()))
                    .collect();
                tracing::debug!(woeid = self.woeid, trends = topics.len(), "refreshed trends");
                self.trends.send_replace(Arc::new(TrendSet {
                    topics,
                    refreshed_at: Some(Utc::now()),
                }));
            }
            Err(e) => {
                tracing::error!(
                    woeid = self.woeid,
                    error = %e,
                    "trend refresh failed; keeping previous trends"
                );
            }
        }
    }

    async fn apply(&self, candidates: &[String]) -> Result<ReconcileOutcome, ReconcileError> {
        let active = self
            .rule_store
            .list_rules()
            .await
            .map_err(|e| rules_error("list", e))?;
        let (mut kept, to_delete, to_add) = plan(&active, candidates);

        if !to_delete.is_empty() {
            self.rule_store
                .delete_rules(&to_delete)
                .await
                .map_err(|e| rules_error("delete", e))?;
        }
        let added = if to_add.is_empty() {
            Vec::new()
        } else {
            self.rule_store
                .add_rules(&to_add)
                .await
                .map_err(|e| rules_error("add", e))?
        };

        let outcome = ReconcileOutcome {
            removed: to_delete,
            added: added.iter().map(|rule| rule.tag.clone()).collect(),
        };
        kept.extend(added);
        self.rules.send_replace(Arc::new(RuleSet { rules: kept }));

        if !outcome.is_noop() {
            tracing::info!(
                removed = outcome.removed.len(),
                added = outcome.added.len(),
                "stream rules reconciled"
            );
        }
        Ok(outcome)
    }

    /// Run a pass every `interval` until `shutdown` fires. The wait re-arms
    /// after each pass completes; a pass already in progress when shutdown
    /// arrives runs to completion.
    pub async fn run_timer(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
            if let Err(e) = self.reconcile_once().await {
                tracing::error!(error = %e, "trend reconciliation failed");
            }
        }
        self.state.send_replace(ReconcilerState::Stopped);
        tracing::info!("trend reconciler stopped");
    }
}

fn rules_error<E>(action: &'static str, source: E) -> ReconcileError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ReconcileError::Rules {
        action,
        source: Box::new(source),
    }
}

#[cfg(test)]
#[path = "trends_test.rs"]
mod tests;
