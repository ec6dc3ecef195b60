//! The trackable event model.
//!
//! Events are a discriminated union keyed by a `type` tag on the wire, with a
//! variant-specific `data` payload. The coarse [`EventCategory`] grouping is
//! redundant with the type but independently settable by callers.

use crate::metadata::EventMetadata;
use crate::types::{EventId, Money, TransactionId};
use serde::{Deserialize, Serialize};

/// Coarse event grouping, orthogonal to the payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Route changes and page views.
    Navigation,
    /// Direct user interactions.
    Interaction,
    /// Cart and payment activity.
    Transaction,
    /// Chat traffic with the assistant.
    Communication,
    /// Session lifecycle, errors, API plumbing.
    System,
}

/// What a cart mutation did, as reported in a `CART_ACTION` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartActionKind {
    /// A line was added or its quantity merged up.
    ItemAdded,
    /// A line was removed.
    ItemRemoved,
    /// A line quantity was changed.
    QuantityChanged,
    /// The cart TTL elapsed and the cart reset to empty.
    CartExpired,
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// The human customer.
    Customer,
    /// The ordering assistant.
    Assistant,
}

/// Severity attached to captured application errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Cosmetic or recoverable without user impact.
    Low,
    /// Degraded behavior, flow still completes.
    Medium,
    /// A flow was interrupted.
    High,
    /// The application boundary caught an unhandled error.
    Critical,
}

/// The variant-specific payload of a tracking event.
///
/// Serializes as `{"type": "...", "data": {...}}`, the shape the delivery
/// sink consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    /// A route was shown.
    PageView {
        /// The route that was shown.
        route: String,
        /// Page title, when available.
        title: Option<String>,
    },
    /// A direct user interaction.
    UserAction {
        /// What the user did, e.g. `"tap:add-to-cart"`.
        action: String,
        /// The interaction target, when identifiable.
        target: Option<String>,
    },
    /// An outbound call to a backend service completed or failed.
    ApiCall {
        /// The endpoint path called.
        endpoint: String,
        /// HTTP method used.
        method: String,
        /// Response status, when one was received.
        status: Option<u16>,
        /// Wall-clock duration of the call.
        duration_ms: Option<u64>,
    },
    /// The cart changed; reflects the post-mutation aggregates.
    CartAction {
        /// What changed.
        action: CartActionKind,
        /// The affected item, when the change targets one line.
        item_name: Option<String>,
        /// Total item count after the mutation.
        total_items: u32,
        /// Total price after the mutation.
        total_price: Money,
    },
    /// A chat message passed through the assistant conversation.
    ChatMessage {
        /// Message author.
        role: ChatRole,
        /// Message length in characters; content itself is never tracked.
        length: usize,
    },
    /// The payment flow advanced a step.
    PaymentFlow {
        /// Flow step name, e.g. `"initiated"`, `"confirmed"`.
        step: String,
        /// Gateway transaction id, once assigned.
        transaction_id: Option<TransactionId>,
        /// Amount in flight, when known.
        amount: Option<Money>,
    },
    /// A runtime error was captured at the application boundary.
    Error {
        /// The error message.
        message: String,
        /// Stack trace, when available.
        stack: Option<String>,
        /// How bad it was.
        severity: ErrorSeverity,
        /// The last journey entries preceding the error.
        journey: Vec<String>,
        /// Arbitrary store-state snapshot for postmortem analysis.
        state_snapshot: serde_json::Value,
    },
    /// Synthetic event emitted once per tracker initialization.
    SessionStart {
        /// External referrer at session start, when known.
        referrer: Option<String>,
    },
    /// Synthetic event emitted on unload.
    SessionEnd {
        /// Session duration from initialization to unload.
        duration_ms: u64,
        /// How many journey entries the session accumulated.
        journey_length: usize,
    },
}

impl EventPayload {
    /// The wire name of this variant, e.g. `"PAGE_VIEW"`.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::PageView { .. } => "PAGE_VIEW",
            Self::UserAction { .. } => "USER_ACTION",
            Self::ApiCall { .. } => "API_CALL",
            Self::CartAction { .. } => "CART_ACTION",
            Self::ChatMessage { .. } => "CHAT_MESSAGE",
            Self::PaymentFlow { .. } => "PAYMENT_FLOW",
            Self::Error { .. } => "ERROR",
            Self::SessionStart { .. } => "SESSION_START",
            Self::SessionEnd { .. } => "SESSION_END",
        }
    }

    /// The category this payload maps to when the caller does not override it.
    pub const fn default_category(&self) -> EventCategory {
        match self {
            Self::PageView { .. } => EventCategory::Navigation,
            Self::UserAction { .. } => EventCategory::Interaction,
            Self::CartAction { .. } | Self::PaymentFlow { .. } => EventCategory::Transaction,
            Self::ChatMessage { .. } => EventCategory::Communication,
            Self::ApiCall { .. }
            | Self::Error { .. }
            | Self::SessionStart { .. }
            | Self::SessionEnd { .. } => EventCategory::System,
        }
    }

    /// Whether this is an ERROR payload, which is excluded from journey
    /// tracking to avoid recursive bloat.
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The variant data serialized as compact JSON, for journey summaries.
    pub fn data_json(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("data").map(ToString::to_string))
            .unwrap_or_default()
    }
}

/// What callers hand to `track()`.
///
/// A draft carries the payload plus optional id and category overrides. It
/// deliberately has no metadata field: the envelope is always computed fresh
/// by the tracker at buffering time.
#[derive(Debug, Clone)]
pub struct EventDraft {
    /// Explicit event id; generated when absent.
    pub id: Option<EventId>,
    /// Category override; defaults from the payload kind when absent.
    pub category: Option<EventCategory>,
    /// The event payload.
    pub payload: EventPayload,
}

impl EventDraft {
    /// A draft for the given payload with defaults for id and category.
    pub const fn new(payload: EventPayload) -> Self {
        Self {
            id: None,
            category: None,
            payload,
        }
    }

    /// Overrides the category.
    #[must_use]
    pub const fn with_category(mut self, category: EventCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Supplies an explicit event id.
    #[must_use]
    pub const fn with_id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }
}

impl From<EventPayload> for EventDraft {
    fn from(payload: EventPayload) -> Self {
        Self::new(payload)
    }
}

/// A fully stamped event as it sits in the buffer and on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    /// Unique event identifier.
    pub id: EventId,
    /// Coarse grouping.
    pub category: EventCategory,
    /// The typed payload, flattened to `type`/`data` on the wire.
    #[serde(flatten)]
    pub payload: EventPayload,
    /// The envelope stamped at buffering time.
    pub metadata: EventMetadata,
}
