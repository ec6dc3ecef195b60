//! Event metadata types for `OrderTrack`.
//!
//! Every tracked event carries a metadata envelope attached at the moment of
//! buffering, not at event construction. Route and device drift between two
//! `track()` calls is therefore captured accurately; metadata is never reused
//! from a previous event.

use crate::types::{CartId, OrderingSessionId, RestaurantId, SessionId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// A snapshot of the device the events are captured on.
///
/// Mirrors the field set typical analytics collectors accept. Only the user
/// agent is required; headless environments leave the rest unset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// The reported user agent string.
    pub user_agent: String,
    /// Operating system / platform name.
    pub platform: Option<String>,
    /// Preferred language tag, e.g. `en-US`.
    pub language: Option<String>,
    /// Physical screen size in pixels, `(width, height)`.
    pub screen: Option<(u32, u32)>,
    /// Viewport size in pixels, `(width, height)`.
    pub viewport: Option<(u32, u32)>,
}

/// The envelope stamped onto every event as it enters the buffer.
///
/// Caller-supplied metadata is impossible by construction: `EventDraft` has
/// no metadata field, and the tracker always computes this envelope fresh
/// from its injected context at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// The stable per-tab session id, persisted across reloads.
    pub session_id: SessionId,
    /// Correlates events to the active cart/order lifecycle, when one exists.
    pub ordering_session_id: Option<OrderingSessionId>,
    /// The customer, when known.
    pub user_id: Option<UserId>,
    /// The restaurant the order targets, when known.
    pub restaurant_id: Option<RestaurantId>,
    /// The active cart, when one exists.
    pub cart_id: Option<CartId>,
    /// Capture time: when the event entered the buffer, not when it was built.
    pub timestamp: Timestamp,
    /// Device snapshot taken at capture time.
    pub device_info: DeviceInfo,
    /// The route the app was showing when the event was captured.
    pub current_route: String,
    /// The route shown before the current one, when known.
    pub previous_route: Option<String>,
    /// The external referrer, when known.
    pub referrer: Option<String>,
}
