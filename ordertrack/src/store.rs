//! Durable key-value persistence for tracker state.
//!
//! [`PersistentStore`] is the capability the host supplies: browser builds
//! back it with local storage, native hosts with a file or embedded database,
//! tests with a map. [`FailedBatchStore`] layers the tracker's two persisted
//! concerns over it: the stable session id, and the capped list of failed
//! batches awaiting recovery.

use crate::batch::EventBatch;
use crate::errors::{StoreError, StoreResult};
use crate::types::{BatchId, SessionId};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Storage key for the persisted session id.
pub const SESSION_ID_KEY: &str = "ordertrack.session_id";

/// Storage key for the persisted failed-batch list.
pub const FAILED_BATCHES_KEY: &str = "ordertrack.failed_batches";

/// Maximum number of failed batches retained; oldest evicted first.
pub const MAX_FAILED_BATCHES: usize = 10;

/// A durable string key-value store.
///
/// Implementations must tolerate concurrent calls; the tracker issues them
/// from timer tasks as well as the capture path.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

/// Tracker-side view of the persistent store.
///
/// Owns serialization of the failed-batch list and the session id. All
/// methods are best-effort from the tracker's perspective; errors surface as
/// `StoreResult` here and are logged (never propagated to callers) one level
/// up.
#[derive(Clone)]
pub struct FailedBatchStore {
    store: Arc<dyn PersistentStore>,
}

impl FailedBatchStore {
    /// Wraps the given backing store.
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    /// Reads the persisted session id, if a previous load saved one.
    pub async fn load_session_id(&self) -> StoreResult<Option<SessionId>> {
        let Some(raw) = self.store.get(SESSION_ID_KEY).await? else {
            return Ok(None);
        };
        match SessionId::try_new(raw) {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                // Corrupt value: drop it and start a fresh session.
                warn!(error = %e, "discarding unparseable persisted session id");
                self.store.remove(SESSION_ID_KEY).await?;
                Ok(None)
            }
        }
    }

    /// Persists the session id for future loads.
    pub async fn save_session_id(&self, id: &SessionId) -> StoreResult<()> {
        self.store.set(SESSION_ID_KEY, id.as_ref()).await
    }

    /// Loads all persisted failed batches, oldest first.
    pub async fn load_failed_batches(&self) -> StoreResult<Vec<EventBatch>> {
        let Some(raw) = self.store.get(FAILED_BATCHES_KEY).await? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).map_err(StoreError::from)
    }

    /// Adds or refreshes `batch` in the persisted list.
    ///
    /// A batch that fails repeatedly keeps a single entry, keyed by its
    /// `batch_id`. The list is capped at [`MAX_FAILED_BATCHES`] entries;
    /// the oldest is evicted to make room.
    pub async fn save_failed_batch(&self, batch: &EventBatch) -> StoreResult<()> {
        let mut batches = self.load_failed_batches().await?;
        if let Some(existing) = batches.iter_mut().find(|b| b.batch_id == batch.batch_id) {
            *existing = batch.clone();
        } else {
            if batches.len() == MAX_FAILED_BATCHES {
                batches.remove(0);
            }
            batches.push(batch.clone());
        }
        self.write_failed_batches(&batches).await
    }

    /// Removes the batch with the given id from the persisted list.
    ///
    /// Idempotent: removing an absent id is not an error.
    pub async fn remove_failed_batch(&self, batch_id: BatchId) -> StoreResult<()> {
        let mut batches = self.load_failed_batches().await?;
        let before = batches.len();
        batches.retain(|b| b.batch_id != batch_id);
        if batches.len() == before {
            return Ok(());
        }
        if batches.is_empty() {
            self.store.remove(FAILED_BATCHES_KEY).await
        } else {
            self.write_failed_batches(&batches).await
        }
    }

    async fn write_failed_batches(&self, batches: &[EventBatch]) -> StoreResult<()> {
        let raw = serde_json::to_string(batches)?;
        self.store.set(FAILED_BATCHES_KEY, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapStore {
        map: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl PersistentStore for MapStore {
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

    fn store() -> FailedBatchStore {
        FailedBatchStore::new(Arc::new(MapStore::default()))
    }

    fn batch() -> EventBatch {
        EventBatch::new(Vec::new(), Timestamp::now())
    }

    #[tokio::test]
    async fn session_id_round_trips() {
        let store = store();
        assert!(store.load_session_id().await.unwrap().is_none());

        let id = SessionId::generate();
        store.save_session_id(&id).await.unwrap();
        assert_eq!(store.load_session_id().await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn failed_batch_round_trips_verbatim() {
        let store = store();
        let original = batch();
        store.save_failed_batch(&original).await.unwrap();

        let loaded = store.load_failed_batches().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].batch_id, original.batch_id);
        assert_eq!(loaded[0].count, original.count);
    }

    #[tokio::test]
    async fn repeated_failure_keeps_one_entry_per_batch() {
        let store = store();
        let b = batch();
        store.save_failed_batch(&b).await.unwrap();
        store.save_failed_batch(&b).await.unwrap();
        store.save_failed_batch(&b).await.unwrap();

        assert_eq!(store.load_failed_batches().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_caps_at_ten_evicting_oldest() {
        let store = store();
        let mut ids = Vec::new();
        for _ in 0..12 {
            let b = batch();
            ids.push(b.batch_id);
            store.save_failed_batch(&b).await.unwrap();
        }

        let loaded = store.load_failed_batches().await.unwrap();
        assert_eq!(loaded.len(), MAX_FAILED_BATCHES);
        // The two oldest were evicted.
        assert_eq!(loaded[0].batch_id, ids[2]);
        assert_eq!(loaded[MAX_FAILED_BATCHES - 1].batch_id, ids[11]);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = store();
        let b = batch();
        store.save_failed_batch(&b).await.unwrap();

        store.remove_failed_batch(b.batch_id).await.unwrap();
        assert!(store.load_failed_batches().await.unwrap().is_empty());

        // Absent id: still Ok.
        store.remove_failed_batch(b.batch_id).await.unwrap();
        store.remove_failed_batch(BatchId::new()).await.unwrap();
    }
}
