//! Bounded concurrent execution of per-item fetches.
//!
//! [`FanOut`] starts at most `max_workers` fetches at a time and hands back
//! their [`HarvestResult`]s in completion order. Every way a fetch can go
//! wrong (an error, the per-item timeout, a panic) is turned into a
//! [`HarvestResult::Failure`]; nothing a single item does can abort its
//! siblings. Dropping a `FanOut` aborts whatever is still running.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use harvester_core::{FailureKind, HarvestItem, HarvestResult, ItemError, Payload};
use tokio::task::JoinSet;

/// Lazily-driven pool of fetch tasks for one batch of items.
pub struct FanOut<F> {
    worker: Arc<F>,
    pending: std::vec::IntoIter<HarvestItem>,
    tasks: JoinSet<HarvestResult>,
    max_workers: usize,
    timeout: Duration,
}

impl<F, Fut, E> FanOut<F>
where
    F: Fn(HarvestItem) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Payload, E>> + Send + 'static,
    E: ItemError,
{
    /// Prepare a run over `items`. Nothing starts until [`FanOut::next`] is
    /// first awaited. A `max_workers` of 0 is treated as 1.
    pub fn new(items: Vec<HarvestItem>, worker: F, max_workers: usize, timeout: Duration) -> Self {
        Self {
            worker: Arc::new(worker),
            pending: items.into_iter(),
            tasks: JoinSet::new(),
            max_workers: max_workers.max(1),
            timeout,
        }
    }

    /// Number of fetches currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for the next fetch to finish. Returns `None` once every item has
    /// produced its result.
    pub async fn next(&mut self) -> Option<HarvestResult> {
        loop {
            while self.tasks.len() < self.max_workers {
                let Some(item) = self.pending.next() else {
                    break;
                };
                self.spawn(item);
            }

            match self.tasks.join_next().await? {
                Ok(result) => return Some(result),
                // Tasks catch their own panics, so this is only reachable
                // while the runtime is shutting down.
                Err(e) => tracing::error!(error = %e, "fetch task did not complete"),
            }
        }
    }

    fn spawn(&mut self, item: HarvestItem) {
        let worker = Arc::clone(&self.worker);
        let timeout = self.timeout;
        self.tasks.spawn(async move {
            let fetch = {
                let item = item.clone();
                async move { tokio::time::timeout(timeout, worker(item)).await }
            };
            let result = match AssertUnwindSafe(fetch).catch_unwind().await {
                Ok(Ok(Ok(payload))) => HarvestResult::Success { item, payload },
                Ok(Ok(Err(e))) => HarvestResult::Failure {
                    item,
                    kind: e.failure_kind(),
                    detail: error_chain(&e),
                },
                Ok(Err(_elapsed)) => HarvestResult::Failure {
                    item,
                    kind: FailureKind::Request,
                    detail: format!("timed out after {}s", timeout.as_secs_f64()),
                },
                Err(panic) => HarvestResult::Failure {
                    item,
                    kind: FailureKind::Unexpected,
                    detail: format!("worker panicked: {}", panic_message(panic.as_ref())),
                },
            };
            log_failure(&result);
            result
        });
    }
}

fn log_failure(result: &HarvestResult) {
    if let HarvestResult::Failure { item, kind, detail } = result {
        match kind {
            FailureKind::Request => {
                tracing::warn!(item = %item, kind = %kind, error = %detail, "request failed");
            }
            FailureKind::Unexpected => {
                tracing::error!(item = %item, kind = %kind, error = %detail, "unexpected failure");
            }
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "fan_out_test.rs"]
mod tests;
