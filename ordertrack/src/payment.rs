//! The pending-payment registry and the real-time channel contract.
//!
//! A payment becomes "pending" when it is initiated and a real-time channel
//! subscription is armed for its result. The asynchronous result arrives
//! out-of-band, correlated by transaction id. Entries that never resolve are
//! pruned on a fixed 5-minute TTL.

use crate::clock::Clock;
use crate::types::{CartId, Money, Timestamp, TransactionId};
use nutype::nutype;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long a pending payment survives without a result.
pub const PAYMENT_TTL: Duration = Duration::from_secs(5 * 60);

/// Backstop prune interval.
pub const PAYMENT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// The single event name subscribed on the payment channel.
pub const PAYMENT_RESPONSE_EVENT: &str = "payment-response";

/// A session-scoped real-time channel name.
///
/// Derived deterministically from the two phone numbers, with no random or
/// time component, so a re-subscription from a reloaded page targets the
/// same channel.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ChannelName(String);

impl ChannelName {
    /// The channel for an order between the given customer and restaurant.
    pub fn for_order(client_phone: &str, restaurant_phone: &str) -> Self {
        Self::try_new(format!("payment-{client_phone}-{restaurant_phone}"))
            .expect("formatted channel name is never empty")
    }
}

/// Payment outcome as reported on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Still processing; a further message will follow.
    Pending,
    /// The payment went through.
    Success,
    /// The payment was declined or errored.
    Failed,
}

impl PaymentStatus {
    /// Whether this status ends the payment's lifecycle.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// The message payload delivered on the payment channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Correlates the message to a pending payment.
    pub transaction_id: TransactionId,
    /// The reported outcome.
    pub status: PaymentStatus,
    /// Human-readable detail, surfaced inline near the payment flow.
    pub message: Option<String>,
}

/// An in-flight payment awaiting its asynchronous result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPayment {
    /// The gateway-issued transaction id; the correlation key.
    pub transaction_id: TransactionId,
    /// The cart this payment pays for.
    pub cart_id: CartId,
    /// The channel its result will arrive on.
    pub channel_name: ChannelName,
    /// The amount in flight.
    pub amount: Money,
    /// When the payment was initiated; the TTL is measured from here.
    pub timestamp: Timestamp,
    /// Masked card details, when the flow captured any.
    pub card_data: Option<serde_json::Value>,
    /// Arbitrary flow metadata.
    pub metadata: Option<serde_json::Value>,
}

/// The outcome of correlating one channel message.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentResolution {
    /// The pending payment the message matched.
    pub payment: PendingPayment,
    /// The reported status.
    pub status: PaymentStatus,
    /// Detail message, if any.
    pub message: Option<String>,
}

/// Registry of in-flight payments.
///
/// Exclusively owns its entries: the UI reads via lookup and never mutates
/// directly.
pub struct PendingPaymentRegistry {
    payments: Mutex<Vec<PendingPayment>>,
    /// Terminal transaction ids and when they resolved; entries older than
    /// the TTL are pruned alongside expired payments.
    processed: Mutex<HashMap<TransactionId, Timestamp>>,
    clock: Arc<dyn Clock>,
}

impl PendingPaymentRegistry {
    /// Creates an empty registry over the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            payments: Mutex::new(Vec::new()),
            processed: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Registers a pending payment.
    ///
    /// Pure append: a duplicate transaction id is flagged in the log but not
    /// rejected or deduplicated. Whether a payment retry should replace the
    /// prior entry is an open product question; until it is answered the
    /// observed append behavior is preserved.
    pub fn add_pending_payment(&self, payment: PendingPayment) {
        let mut payments = self.payments.lock();
        if payments
            .iter()
            .any(|p| p.transaction_id == payment.transaction_id)
        {
            warn!(
                transaction_id = %payment.transaction_id,
                "duplicate pending payment registered for the same transaction id"
            );
        }
        payments.push(payment);
    }

    /// Looks up the pending payment for a transaction id.
    pub fn find(&self, transaction_id: &TransactionId) -> Option<PendingPayment> {
        self.payments
            .lock()
            .iter()
            .find(|p| &p.transaction_id == transaction_id)
            .cloned()
    }

    /// Removes all entries for a transaction id.
    pub fn remove(&self, transaction_id: &TransactionId) {
        self.payments
            .lock()
            .retain(|p| &p.transaction_id != transaction_id);
    }

    /// Prunes every entry older than the 5-minute TTL.
    ///
    /// Also evicts processed-marker entries whose TTL window has passed: once
    /// no pending payment for that id can exist any more, the re-delivery
    /// guard has nothing left to guard.
    pub fn clear_expired_payments(&self) {
        let now = self.clock.now();
        let mut payments = self.payments.lock();
        let before = payments.len();
        payments.retain(|p| now < p.timestamp.plus(PAYMENT_TTL));
        let pruned = before - payments.len();
        if pruned > 0 {
            debug!(pruned, "cleared expired pending payments");
        }
        self.processed
            .lock()
            .retain(|_, resolved_at| now < resolved_at.plus(PAYMENT_TTL));
    }

    /// Correlates one channel message with the registry.
    ///
    /// Returns the matched resolution, or `None` for unmatched transaction
    /// ids and re-deliveries. Marking is idempotent: a message processed
    /// twice is a no-op on state, observable only in the log. A terminal
    /// status removes the entry; a `pending` interim message leaves it in
    /// place for the result that follows.
    pub fn handle_payment_event(&self, event: &PaymentEvent) -> Option<PaymentResolution> {
        if self.processed.lock().contains_key(&event.transaction_id) {
            debug!(
                transaction_id = %event.transaction_id,
                "payment message already processed; ignoring re-delivery"
            );
            return None;
        }

        let Some(payment) = self.find(&event.transaction_id) else {
            warn!(
                transaction_id = %event.transaction_id,
                "payment message did not match any pending payment"
            );
            return None;
        };

        if event.status.is_terminal() {
            self.processed
                .lock()
                .insert(event.transaction_id.clone(), self.clock.now());
            self.remove(&event.transaction_id);
        }

        Some(PaymentResolution {
            payment,
            status: event.status,
            message: event.message.clone(),
        })
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.payments.lock().len()
    }

    /// Whether no payments are pending.
    pub fn is_empty(&self) -> bool {
        self.payments.lock().is_empty()
    }

    /// Spawns the 60-second backstop prune task.
    pub fn spawn_sweeper(registry: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(registry);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PAYMENT_SWEEP_INTERVAL);
            interval.tick().await; // first tick is immediate
            loop {
                interval.tick().await;
                let Some(registry) = weak.upgrade() else {
                    return;
                };
                registry.clear_expired_payments();
            }
        })
    }
}
