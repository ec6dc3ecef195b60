//! HTTP delivery adapter for `OrderTrack`.
//!
//! Posts JSON-encoded event batches to the collection endpoint. Any 2xx
//! response is success; every other status and every network error is a
//! delivery failure, handled identically upstream (persist, retry on the
//! linear backoff schedule).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use ordertrack::batch::EventBatch;
use ordertrack::errors::{TransportError, TransportResult};
use ordertrack::transport::{BatchTransport, BeaconTransport};
use tracing::{debug, warn};

/// Asynchronous batch delivery over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Creates a transport posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Creates a transport reusing an existing client (connection pooling).
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn send(&self, batch: &EventBatch) -> TransportResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(batch)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(batch_id = %batch.batch_id, %status, "batch accepted");
            Ok(())
        } else {
            Err(TransportError::Http {
                status: status.as_u16(),
            })
        }
    }
}

/// Best-effort fire-and-forget delivery for unload.
///
/// The request is detached onto the runtime and never awaited; if the host
/// tears down first, the batch is lost, which the unload contract accepts.
#[derive(Debug, Clone)]
pub struct HttpBeacon {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBeacon {
    /// Creates a beacon posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl BeaconTransport for HttpBeacon {
    fn send(&self, batch: &EventBatch) {
        let request = self.client.post(&self.endpoint).json(batch);
        let batch_id = batch.batch_id;
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) => {
                    debug!(%batch_id, status = %response.status(), "beacon send completed");
                }
                Err(e) => {
                    // No retry is possible on the unload path.
                    warn!(%batch_id, error = %e, "beacon send failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordertrack::types::Timestamp;

    #[tokio::test]
    async fn unreachable_endpoint_reports_a_network_failure() {
        // Reserved TEST-NET-1 address; nothing listens there.
        let transport = HttpTransport::new("http://192.0.2.1:9/events");
        let batch = EventBatch::new(Vec::new(), Timestamp::now());

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            transport.send(&batch),
        )
        .await;

        if let Ok(outcome) = result {
            assert!(matches!(outcome, Err(TransportError::Network(_))));
        }
    }

    #[test]
    fn transport_is_cloneable_for_sharing() {
        let transport = HttpTransport::new("http://localhost/events");
        let clone = transport.clone();
        assert_eq!(clone.endpoint, transport.endpoint);
    }
}
