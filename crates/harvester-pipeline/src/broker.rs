//! Message broker seam and its Kafka implementation.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use harvester_core::KafkaConfig;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use thiserror::Error;

/// Oldest protocol level the producer is allowed to fall back to.
const BROKER_VERSION_FALLBACK: &str = "0.10.0";

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker did not acknowledge in time: {0}")]
    Timeout(String),

    #[error("broker connection error: {0}")]
    Connection(String),
}

/// Destination for published messages.
///
/// `send` may only enqueue; a message counts as published once a following
/// `flush` has returned `Ok`. Every `flush` settles exactly the sends made
/// since the previous `flush` or `discard_pending`.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    async fn send(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<(), BrokerError>;

    async fn flush(&self) -> Result<(), BrokerError>;

    /// Stop tracking sends not yet settled by a `flush`. Messages already
    /// handed to the broker may still be delivered.
    fn discard_pending(&self) {}
}

#[async_trait]
impl<T: Broker + ?Sized> Broker for std::sync::Arc<T> {
    async fn send(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<(), BrokerError> {
        (**self).send(topic, key, value).await
    }

    async fn flush(&self) -> Result<(), BrokerError> {
        (**self).flush().await
    }

    fn discard_pending(&self) {
        (**self).discard_pending();
    }
}

/// Kafka producer with explicit flush-and-acknowledge semantics.
pub struct KafkaBroker {
    producer: FutureProducer,
    pending: Mutex<Vec<DeliveryFuture>>,
    flush_timeout: Duration,
}

impl KafkaBroker {
    /// Build a producer for `host:port`. No connection is made until the
    /// first message is sent.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connection`] if the client configuration is
    /// rejected.
    pub fn connect(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let broker = Self::with_client_config(
            &producer_config(config),
            Duration::from_millis(config.flush_timeout_ms),
        )?;
        tracing::info!(
            bootstrap_servers = %config.bootstrap_servers(),
            "kafka producer created"
        );
        Ok(broker)
    }

    fn with_client_config(
        client_config: &ClientConfig,
        flush_timeout: Duration,
    ) -> Result<Self, BrokerError> {
        let producer: FutureProducer = client_config.create().map_err(|e| classify(&e))?;
        Ok(Self {
            producer,
            pending: Mutex::new(Vec::new()),
            flush_timeout,
        })
    }

    fn take_pending(&self) -> Vec<DeliveryFuture> {
        match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn send(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<(), BrokerError> {
        let record = FutureRecord::to(topic).key(key).payload(value);
        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| classify(&e))?;

        match self.pending.lock() {
            Ok(mut pending) => pending.push(delivery),
            Err(poisoned) => poisoned.into_inner().push(delivery),
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), BrokerError> {
        let pending = self.take_pending();
        let producer = self.producer.clone();
        let timeout = self.flush_timeout;
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| BrokerError::Connection(format!("flush task failed: {e}")))?
            .map_err(|e| classify(&e))?;

        let mut first_error = None;
        for delivery in pending {
            let outcome = match delivery.await {
                Ok(Ok(_)) => continue,
                Ok(Err((e, _))) => classify(&e),
                Err(_) => BrokerError::Connection("delivery was cancelled".to_string()),
            };
            first_error.get_or_insert(outcome);
        }
        first_error.map_or(Ok(()), Err)
    }

    fn discard_pending(&self) {
        let dropped = self.take_pending().len();
        if dropped > 0 {
            tracing::warn!(dropped, "dropped unacknowledged deliveries of a failed publish");
        }
    }
}

fn producer_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", config.bootstrap_servers())
        .set("broker.version.fallback", BROKER_VERSION_FALLBACK)
        .set("message.timeout.ms", config.message_timeout_ms.to_string());
    client_config
}

fn classify(err: &KafkaError) -> BrokerError {
    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::RequestTimedOut,
        ) => BrokerError::Timeout(err.to_string()),
        _ => BrokerError::Connection(err.to_string()),
    }
}
