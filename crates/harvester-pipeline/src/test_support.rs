//! In-memory doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::broker::{Broker, BrokerError};

#[derive(Debug, Clone)]
pub(crate) struct SentMessage {
    pub(crate) topic: String,
    pub(crate) key: String,
    pub(crate) body: serde_json::Value,
}

/// Broker that keeps every sent message. `fail_flush` makes every flush
/// time out; `send_budget` lets that many sends through before exactly one
/// send is refused.
#[derive(Default)]
pub(crate) struct RecordingBroker {
    sent: Mutex<Vec<SentMessage>>,
    flushes: AtomicUsize,
    pending: AtomicUsize,
    settled: AtomicUsize,
    send_budget: Mutex<Option<usize>>,
    pub(crate) fail_flush: bool,
}

impl RecordingBroker {
    pub(crate) fn failing() -> Self {
        Self {
            fail_flush: true,
            ..Self::default()
        }
    }

    pub(crate) fn refusing_send_after(sends: usize) -> Self {
        Self {
            send_budget: Mutex::new(Some(sends)),
            ..Self::default()
        }
    }

    pub(crate) fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Sends not yet settled by a flush or discarded.
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Sends that a successful flush has acknowledged.
    pub(crate) fn settled(&self) -> usize {
        self.settled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn send(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<(), BrokerError> {
        {
            let mut budget = self.send_budget.lock().unwrap();
            match *budget {
                Some(0) => {
                    *budget = None;
                    return Err(BrokerError::Connection("local queue full".to_string()));
                }
                Some(n) => *budget = Some(n - 1),
                None => {}
            }
        }
        let body = serde_json::from_slice(value)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(value).into()));
        self.sent.lock().unwrap().push(SentMessage {
            topic: topic.to_string(),
            key: String::from_utf8(key.to_vec()).unwrap(),
            body,
        });
        self.pending.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn flush(&self) -> Result<(), BrokerError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let pending = self.pending.swap(0, Ordering::SeqCst);
        if self.fail_flush {
            return Err(BrokerError::Timeout("no acknowledgement".to_string()));
        }
        self.settled.fetch_add(pending, Ordering::SeqCst);
        Ok(())
    }

    fn discard_pending(&self) {
        self.pending.store(0, Ordering::SeqCst);
    }
}
