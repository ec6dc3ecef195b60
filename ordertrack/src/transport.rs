//! Delivery transports for event batches.
//!
//! Two seams: the normal asynchronous path used by flushes and retries, and
//! the beacon path used only on unload, where awaiting is impossible because
//! the host may terminate before a future resolves.

use crate::batch::EventBatch;
use crate::errors::TransportResult;
use async_trait::async_trait;

/// The asynchronous batch delivery path.
///
/// Any `Err` is a delivery failure; the tracker treats all failure variants
/// identically (persist, then retry on the linear backoff schedule).
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Delivers one batch to the sink.
    async fn send(&self, batch: &EventBatch) -> TransportResult<()>;
}

/// The best-effort fire-and-forget path for unload.
///
/// Implementations must return immediately; no retry or error reporting is
/// possible once the host is tearing down. Losing the batch here is
/// accepted.
pub trait BeaconTransport: Send + Sync {
    /// Hands off one batch without waiting for an outcome.
    fn send(&self, batch: &EventBatch);
}

/// A beacon that drops every batch; for hosts with no teardown channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBeacon;

impl BeaconTransport for NoopBeacon {
    fn send(&self, _batch: &EventBatch) {}
}
