//! End-to-end tests of the tracking pipeline over the in-memory adapters:
//! flush, failure persistence, the linear retry schedule, and recovery on a
//! later initialization.

use std::sync::Arc;
use std::time::Duration;

use ordertrack::cart::{CartStore, MenuItem, CART_TTL};
use ordertrack::clock::{ManualClock, SystemClock};
use ordertrack::config::{BatchSize, RetryDelayMs, TrackingConfig};
use ordertrack::event::{CartActionKind, EventPayload};
use ordertrack::store::FAILED_BATCHES_KEY;
use ordertrack::types::Money;
use ordertrack::EventTracker;
use ordertrack_memory::{InMemoryStore, InMemoryTransport};

fn page_view(route: &str) -> EventPayload {
    EventPayload::PageView {
        route: route.to_string(),
        title: None,
    }
}

fn config(max_retries: u32, retry_delay_ms: u64) -> TrackingConfig {
    TrackingConfig {
        max_retries,
        retry_delay: RetryDelayMs::try_new(retry_delay_ms).unwrap(),
        ..TrackingConfig::default()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn permanently_failing_sink_retries_on_the_linear_schedule() {
    let transport = InMemoryTransport::always_failing();
    let store = InMemoryStore::new();
    let tracker = EventTracker::builder(Arc::new(store.clone()), Arc::new(transport.clone()))
        .config(config(3, 2_000))
        .build();

    tracker.initialize().await;
    tracker.track(page_view("/menu"));
    tracker.flush();

    // Walk well past the full schedule; nothing further may fire.
    tokio::time::sleep(Duration::from_secs(60)).await;

    let attempts = transport.attempts();
    assert_eq!(
        attempts.len(),
        4,
        "one initial attempt plus exactly three retries"
    );
    assert!(attempts.iter().all(|a| !a.accepted));

    let deltas: Vec<u128> = attempts
        .windows(2)
        .map(|w| (w[1].at - w[0].at).as_millis())
        .collect();
    assert_eq!(deltas, vec![2_000, 4_000, 6_000]);

    // The batch is left persisted for the next initialization.
    let raw = store.raw(FAILED_BATCHES_KEY).expect("batch persisted");
    assert!(raw.contains(&attempts[0].batch.batch_id.to_string()));
}

#[tokio::test(start_paused = true)]
async fn persisted_batch_is_recovered_and_pruned_on_next_initialize() {
    let store = InMemoryStore::new();

    // First life: the sink is down, the batch ends up persisted.
    let failing = InMemoryTransport::always_failing();
    let first = EventTracker::builder(Arc::new(store.clone()), Arc::new(failing.clone()))
        .config(config(0, 2_000))
        .build();
    first.initialize().await;
    first.track(page_view("/menu"));
    first.flush();
    settle().await;

    let failed_batch = failing.attempts()[0].batch.clone();
    assert!(store.raw(FAILED_BATCHES_KEY).is_some());
    first.destroy();
    settle().await;

    // Second life: the sink is back; recovery re-submits the batch.
    let healthy = InMemoryTransport::new();
    let second = EventTracker::builder(Arc::new(store.clone()), Arc::new(healthy.clone())).build();
    second.initialize().await;
    settle().await;

    let delivered = healthy.delivered();
    assert!(
        delivered.iter().any(|b| b.batch_id == failed_batch.batch_id),
        "recovered batch re-submitted with its original id"
    );
    let recovered = delivered
        .iter()
        .find(|b| b.batch_id == failed_batch.batch_id)
        .unwrap();
    assert_eq!(recovered.count, failed_batch.count);

    // Pruned from storage after the successful resend.
    assert!(store.raw(FAILED_BATCHES_KEY).is_none());
}

#[tokio::test(start_paused = true)]
async fn transient_failure_recovers_within_the_retry_budget() {
    let transport = InMemoryTransport::failing_first(2);
    let store = InMemoryStore::new();
    let tracker = EventTracker::builder(Arc::new(store.clone()), Arc::new(transport.clone()))
        .config(config(3, 2_000))
        .build();

    tracker.initialize().await;
    tracker.track(page_view("/menu"));
    tracker.flush();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(transport.attempts().len(), 3);
    assert_eq!(transport.delivered().len(), 1);
    // Storage is clean again after the eventual success.
    assert!(store.raw(FAILED_BATCHES_KEY).is_none());
}

#[tokio::test(start_paused = true)]
async fn disabling_local_storage_skips_failure_persistence() {
    let transport = InMemoryTransport::always_failing();
    let store = InMemoryStore::new();
    let tracker = EventTracker::builder(Arc::new(store.clone()), Arc::new(transport.clone()))
        .config(TrackingConfig {
            enable_local_storage: false,
            ..config(1, 1_000)
        })
        .build();

    tracker.initialize().await;
    tracker.track(page_view("/menu"));
    tracker.flush();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(transport.attempts().len() > 1);
    assert!(store.raw(FAILED_BATCHES_KEY).is_none());
}

#[tokio::test(start_paused = true)]
async fn cart_mutations_flow_into_delivered_batches() {
    let transport = InMemoryTransport::new();
    let tracker = EventTracker::builder(
        Arc::new(InMemoryStore::new()),
        Arc::new(transport.clone()),
    )
    .config(TrackingConfig {
        batch_size: BatchSize::try_new(2).unwrap(),
        ..TrackingConfig::default()
    })
    .build();
    tracker.initialize().await;

    let cart = CartStore::new(Arc::new(SystemClock));
    cart.set_tracker(tracker.clone());

    let burger = MenuItem {
        id: 5,
        name: "burger".to_string(),
        unit_price: Money::from_cents(1000),
    };
    cart.add_item(&burger, &[], 1);
    cart.add_item(&burger, &[], 2);
    tracker.flush();
    settle().await;

    let delivered = transport.delivered();
    assert!(!delivered.is_empty());
    let cart_events: Vec<_> = delivered
        .iter()
        .flat_map(|b| &b.events)
        .filter_map(|e| match &e.payload {
            EventPayload::CartAction {
                action,
                total_items,
                total_price,
                ..
            } => Some((*action, *total_items, *total_price)),
            _ => None,
        })
        .collect();

    assert_eq!(
        cart_events,
        vec![
            (CartActionKind::ItemAdded, 1, Money::from_cents(1000)),
            (CartActionKind::ItemAdded, 3, Money::from_cents(3000)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn expiry_detected_during_a_mutation_emits_cart_expired() {
    let transport = InMemoryTransport::new();
    let tracker = EventTracker::builder(
        Arc::new(InMemoryStore::new()),
        Arc::new(transport.clone()),
    )
    .build();
    tracker.initialize().await;

    let clock = ManualClock::new();
    let cart = CartStore::new(Arc::new(clock.clone()));
    cart.set_tracker(tracker.clone());

    let burger = MenuItem {
        id: 5,
        name: "burger".to_string(),
        unit_price: Money::from_cents(1000),
    };
    cart.add_item(&burger, &[], 1);
    let line_id = cart.cart().lines[0].id.clone();

    // The TTL elapses; the next mutation notices on entry.
    clock.advance(CART_TTL);
    cart.remove_item(&line_id);
    tracker.flush();
    settle().await;

    let actions: Vec<CartActionKind> = transport
        .delivered()
        .iter()
        .flat_map(|b| &b.events)
        .filter_map(|e| match &e.payload {
            EventPayload::CartAction { action, .. } => Some(*action),
            _ => None,
        })
        .collect();

    // One reset notification, and no removal: the line was already gone.
    assert_eq!(
        actions,
        vec![CartActionKind::ItemAdded, CartActionKind::CartExpired]
    );
}
