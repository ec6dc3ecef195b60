//! In-memory adapters for `OrderTrack`.
//!
//! This crate provides in-memory implementations of the tracker's capability
//! traits, useful for tests and for headless environments where neither
//! durable storage nor a delivery endpoint exists. The transports double as
//! test instruments: they record every batch they see and can be scripted to
//! fail.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ordertrack::batch::EventBatch;
use ordertrack::errors::{StoreResult, TransportError, TransportResult};
use ordertrack::store::PersistentStore;
use ordertrack::transport::{BatchTransport, BeaconTransport};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Thread-safe in-memory key-value store.
///
/// Clones share the same storage, so a "reloaded" tracker instance can be
/// pointed at the same store to exercise persistence across lifetimes.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    map: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw value stored under `key`, for test assertions.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }
}

#[async_trait]
impl PersistentStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.map.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.map.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.map.lock().remove(key);
        Ok(())
    }
}

/// One observed delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    /// The batch as presented to the transport.
    pub batch: EventBatch,
    /// When the attempt happened, on the tokio clock.
    pub at: Instant,
    /// Whether the transport accepted it.
    pub accepted: bool,
}

/// A scriptable in-memory delivery transport.
///
/// Records every attempt with its tokio-clock instant so tests under
/// `start_paused` can assert exact retry schedules. Configured to fail the
/// first `n` attempts, or every attempt.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    attempts: Arc<Mutex<Vec<DeliveryAttempt>>>,
    failures_remaining: Arc<AtomicUsize>,
}

impl InMemoryTransport {
    /// A transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that rejects the first `n` attempts, then accepts.
    pub fn failing_first(n: usize) -> Self {
        Self {
            attempts: Arc::new(Mutex::new(Vec::new())),
            failures_remaining: Arc::new(AtomicUsize::new(n)),
        }
    }

    /// A transport that rejects every attempt.
    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    /// All attempts observed so far, in order.
    pub fn attempts(&self) -> Vec<DeliveryAttempt> {
        self.attempts.lock().clone()
    }

    /// Only the accepted batches, in order.
    pub fn delivered(&self) -> Vec<EventBatch> {
        self.attempts
            .lock()
            .iter()
            .filter(|a| a.accepted)
            .map(|a| a.batch.clone())
            .collect()
    }
}

#[async_trait]
impl BatchTransport for InMemoryTransport {
    async fn send(&self, batch: &EventBatch) -> TransportResult<()> {
        // Consume one scripted failure if any remain; usize::MAX means
        // "fail forever" and is never decremented.
        let fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        let accept = !fail;

        self.attempts.lock().push(DeliveryAttempt {
            batch: batch.clone(),
            at: Instant::now(),
            accepted: accept,
        });

        if accept {
            Ok(())
        } else {
            Err(TransportError::Network("scripted failure".to_string()))
        }
    }
}

/// A beacon that records the batches handed to it.
#[derive(Clone, Default)]
pub struct InMemoryBeacon {
    batches: Arc<Mutex<Vec<EventBatch>>>,
}

impl InMemoryBeacon {
    /// Creates an empty recording beacon.
    pub fn new() -> Self {
        Self::default()
    }

    /// The batches received so far.
    pub fn batches(&self) -> Vec<EventBatch> {
        self.batches.lock().clone()
    }
}

impl BeaconTransport for InMemoryBeacon {
    fn send(&self, batch: &EventBatch) {
        self.batches.lock().push(batch.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordertrack::types::Timestamp;

    fn batch() -> EventBatch {
        EventBatch::new(Vec::new(), Timestamp::now())
    }

    #[tokio::test]
    async fn store_round_trips_and_clones_share_storage() {
        let store = InMemoryStore::new();
        store.set("k", "v").await.unwrap();

        let clone = store.clone();
        assert_eq!(clone.get("k").await.unwrap(), Some("v".to_string()));

        clone.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn failing_first_rejects_then_accepts() {
        let transport = InMemoryTransport::failing_first(2);
        let b = batch();

        assert!(transport.send(&b).await.is_err());
        assert!(transport.send(&b).await.is_err());
        assert!(transport.send(&b).await.is_ok());

        let attempts = transport.attempts();
        assert_eq!(attempts.len(), 3);
        assert_eq!(transport.delivered().len(), 1);
    }

    #[tokio::test]
    async fn always_failing_never_accepts() {
        let transport = InMemoryTransport::always_failing();
        let b = batch();
        for _ in 0..20 {
            assert!(transport.send(&b).await.is_err());
        }
        assert!(transport.delivered().is_empty());
    }

    #[tokio::test]
    async fn beacon_records_batches() {
        let beacon = InMemoryBeacon::new();
        beacon.send(&batch());
        beacon.send(&batch());
        assert_eq!(beacon.batches().len(), 2);
    }
}
