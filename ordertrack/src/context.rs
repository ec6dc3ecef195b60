//! The ambient page/app context the tracker samples at capture time.
//!
//! The original design read browser globals (location, navigator, the cart
//! store's internals) directly. Here that coupling is inverted: the
//! application supplies a [`TrackingContext`] at tracker construction, and
//! the tracker asks it for a fresh [`ContextSnapshot`] every time an event is
//! buffered.

use crate::metadata::DeviceInfo;
use crate::types::{CartId, OrderingSessionId, RestaurantId, UserId};

/// One coherent sample of the ambient context.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    /// Device snapshot.
    pub device_info: DeviceInfo,
    /// The route currently shown.
    pub current_route: String,
    /// The previously shown route, when known.
    pub previous_route: Option<String>,
    /// External referrer, when known.
    pub referrer: Option<String>,
    /// The signed-in customer, when known.
    pub user_id: Option<UserId>,
    /// The restaurant in scope, when known.
    pub restaurant_id: Option<RestaurantId>,
    /// The active cart, when one exists.
    pub cart_id: Option<CartId>,
}

/// Capability trait supplying ambient context to the tracker.
///
/// `snapshot` is called once per tracked event; implementations should be
/// cheap and must never block. `ordering_session` is consulted exactly once,
/// at initialization, to seed the ordering-session correlation id.
pub trait TrackingContext: Send + Sync {
    /// A fresh sample of the ambient context.
    fn snapshot(&self) -> ContextSnapshot;

    /// Resolves the ordering-session correlation id, if an order is active.
    fn ordering_session(&self) -> Option<OrderingSessionId> {
        None
    }
}

/// A fixed context for headless environments and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    /// The snapshot returned on every sample.
    pub snapshot: ContextSnapshot,
    /// The ordering session resolved at initialization.
    pub ordering_session: Option<OrderingSessionId>,
}

impl StaticContext {
    /// A context pinned to the given route.
    pub fn on_route(route: impl Into<String>) -> Self {
        Self {
            snapshot: ContextSnapshot {
                current_route: route.into(),
                ..ContextSnapshot::default()
            },
            ordering_session: None,
        }
    }
}

impl TrackingContext for StaticContext {
    fn snapshot(&self) -> ContextSnapshot {
        self.snapshot.clone()
    }

    fn ordering_session(&self) -> Option<OrderingSessionId> {
        self.ordering_session.clone()
    }
}
