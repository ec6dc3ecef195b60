//! Immutable event batches.
//!
//! A batch is formed by atomically draining the tracker's buffer: the events
//! are moved, not referenced, so later `track()` calls cannot mutate a batch
//! in flight. Insertion order is flush order and is never reordered.

use crate::event::TrackingEvent;
use crate::types::{BatchId, Timestamp};
use serde::{Deserialize, Serialize};

/// A group of buffered events sent together to the delivery sink.
///
/// Wire shape: `{"batchId", "events", "timestamp" (epoch-ms), "count"}`.
/// `count == events.len()` holds at the only construction site; the struct
/// exposes no mutation after that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBatch {
    /// Deduplication key for the sink; retried batches reuse it.
    pub batch_id: BatchId,
    /// The events, in `track()` call order.
    pub events: Vec<TrackingEvent>,
    /// When the batch was formed.
    #[serde(with = "epoch_millis")]
    pub timestamp: Timestamp,
    /// Number of events; always equals `events.len()`.
    pub count: usize,
}

impl EventBatch {
    /// Forms a batch from drained buffer contents.
    pub fn new(events: Vec<TrackingEvent>, timestamp: Timestamp) -> Self {
        let count = events.len();
        Self {
            batch_id: BatchId::new(),
            events,
            timestamp,
            count,
        }
    }

    /// Whether the batch carries no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

mod epoch_millis {
    //! Epoch-millisecond wire representation for batch timestamps.

    use crate::types::Timestamp;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        ts.epoch_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        DateTime::<Utc>::from_timestamp_millis(millis)
            .map(Timestamp::new)
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}
