//! Live streaming session: trend-driven rules, a transport pushing events,
//! and a single consumer publishing them.

use std::sync::Arc;
use std::time::Duration;

use harvester_core::{
    Payload, RuleStore, StreamEvent, StreamRetryConfig, StreamTransport, TrendSource,
    TWITTER_STREAM_TOPIC,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backoff::reconnect_delay;
use crate::broker::Broker;
use crate::publish::PublishPipeline;
use crate::trends::TrendReconciler;

const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// A connection that lasted this long counts as healthy; the next failure
/// starts the retry budget and backoff from scratch.
const STABLE_CONNECTION: Duration = Duration::from_secs(300);

/// Reconnect policy and buffering for a session.
#[derive(Debug, Clone)]
pub struct StreamSessionConfig {
    /// Reconnects after the transport fails; `0` ends the session on the
    /// first failure.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub channel_capacity: usize,
}

impl From<&StreamRetryConfig> for StreamSessionConfig {
    fn from(retry: &StreamRetryConfig) -> Self {
        Self {
            max_retries: retry.max_retries,
            backoff_base: Duration::from_secs(retry.backoff_base_secs),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Counters for one streaming session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub published: u64,
    pub failed: u64,
    pub reconnects: u32,
}

/// Run a streaming session until the transport gives up or `shutdown` fires.
///
/// Rules are reconciled once up front, then on the reconciler's timer. Events
/// are published one by one on the stream topic; a publish failure is logged
/// and counted, the event is dropped, and streaming continues.
pub async fn run_stream_session<T, R, S, B>(
    reconciler: Arc<TrendReconciler<T, R>>,
    transport: Arc<S>,
    pipeline: Arc<PublishPipeline<B>>,
    config: StreamSessionConfig,
    shutdown: CancellationToken,
) -> StreamStats
where
    T: TrendSource,
    R: RuleStore,
    S: StreamTransport,
    B: Broker,
{
    if let Err(e) = reconciler.reconcile_once().await {
        tracing::error!(error = %e, "initial trend reconciliation failed");
    }

    let session = shutdown.child_token();
    let timer = tokio::spawn(Arc::clone(&reconciler).run_timer(session.clone()));

    let (events_tx, events_rx) = mpsc::channel(config.channel_capacity.max(1));
    let consumer = tokio::spawn(consume(events_rx, pipeline));

    let reconnects = drive_transport(transport.as_ref(), &events_tx, &config, &session).await;

    drop(events_tx);
    session.cancel();
    if let Err(e) = timer.await {
        tracing::error!(error = %e, "trend reconciler task failed");
    }
    let (published, failed) = match consumer.await {
        Ok(counts) => counts,
        Err(e) => {
            tracing::error!(error = %e, "stream consumer task failed");
            (0, 0)
        }
    };

    let stats = StreamStats {
        published,
        failed,
        reconnects,
    };
    tracing::info!(
        published = stats.published,
        failed = stats.failed,
        reconnects = stats.reconnects,
        "streaming session finished"
    );
    stats
}

/// Keep the transport running, reconnecting with backoff after failures.
/// Returns the number of reconnects.
async fn drive_transport<S: StreamTransport>(
    transport: &S,
    events: &mpsc::Sender<StreamEvent>,
    config: &StreamSessionConfig,
    session: &CancellationToken,
) -> u32 {
    let mut attempt = 0u32;
    let mut reconnects = 0u32;
    loop {
        let connected_at = Instant::now();
        let result = transport.run(events.clone(), session.clone()).await;
        if session.is_cancelled() {
            return reconnects;
        }
        if attempt > 0 && connected_at.elapsed() >= STABLE_CONNECTION {
            tracing::debug!(attempt, "connection was stable; resetting retry budget");
            attempt = 0;
        }
        match result {
            Ok(()) => {
                tracing::info!("stream closed");
                return reconnects;
            }
            Err(e) if attempt >= config.max_retries => {
                tracing::error!(error = %e, attempts = attempt + 1, "stream failed; giving up");
                return reconnects;
            }
            Err(e) => {
                let delay = reconnect_delay(config.backoff_base, attempt);
                tracing::warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "stream failed; reconnecting after backoff"
                );
                tokio::select! {
                    () = session.cancelled() => return reconnects,
                    () = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
                reconnects += 1;
            }
        }
    }
}

async fn consume<B: Broker>(
    mut events: mpsc::Receiver<StreamEvent>,
    pipeline: Arc<PublishPipeline<B>>,
) -> (u64, u64) {
    let mut published = 0u64;
    let mut failed = 0u64;
    while let Some(event) = events.recv().await {
        let payload = Payload::Records(vec![event.record]);
        match pipeline.publish(TWITTER_STREAM_TOPIC, &payload).await {
            Ok(_) => published += 1,
            Err(e) => {
                failed += 1;
                tracing::error!(trend = ?event.tag, error = %e, "failed to publish stream event");
            }
        }
    }
    (published, failed)
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod tests;
