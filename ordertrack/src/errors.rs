//! Error types for `OrderTrack`.
//!
//! The tracking pipeline is fully contained: no error defined here ever
//! propagates out of `track()`/`flush()` into caller code. The types exist
//! for the seams — transports and persistent stores report failures through
//! them, and the tracker decides what to persist, retry, or log.
//!
//! # Error Categories
//!
//! - **`TransportError`**: batch delivery failures (network or non-2xx)
//! - **`StoreError`**: durable key-value persistence failures
//! - **`TrackingError`**: composition of both for internal plumbing

use thiserror::Error;

/// Errors produced by a batch delivery transport.
///
/// Every variant is treated identically by the tracker: the batch is
/// persisted for recovery and retried on the linear backoff schedule. The
/// distinction exists for logging and for sinks that want to special-case
/// status codes.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The sink answered with a non-success HTTP status.
    #[error("delivery rejected with HTTP status {status}")]
    Http {
        /// The status code returned by the sink.
        status: u16,
    },

    /// The request never completed (DNS, connection, timeout).
    #[error("network failure: {0}")]
    Network(String),

    /// The batch could not be encoded for the wire.
    #[error("failed to encode batch: {0}")]
    Encode(String),
}

/// Errors produced by a persistent key-value store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing store failed (I/O, quota, unavailable).
    #[error("storage backend failure: {0}")]
    Backend(String),

    /// A stored value could not be serialized or deserialized.
    #[error("storage serialization failure: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Any failure inside the tracking pipeline.
#[derive(Debug, Clone, Error)]
pub enum TrackingError {
    /// A batch send failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Failed-batch persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for persistent store operations.
pub type StoreResult<T> = Result<T, StoreError>;
