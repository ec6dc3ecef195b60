//! The event tracker: buffering, batching, retry, and lifecycle.
//!
//! [`EventTracker`] is an explicitly constructed, injectable service owned by
//! the application root and shared as a cheap clone. It owns the in-memory
//! event buffer, the periodic flush task, the linear retry backoff for failed
//! sends, the user-journey ring buffer, and the unload hand-off.
//!
//! # Failure containment
//!
//! Nothing in here throws into caller code. `track()` and `flush()` are
//! infallible; delivery and persistence failures are logged and handled
//! internally (persist, retry, recover on the next initialization).
//!
//! # Runtime
//!
//! The tracker schedules its flush timer, sends, and retries on the ambient
//! tokio runtime, so its methods must be called from within one.

use crate::batch::EventBatch;
use crate::clock::{Clock, SystemClock};
use crate::config::TrackingConfig;
use crate::context::{StaticContext, TrackingContext};
use crate::errors::TransportError;
use crate::event::{ErrorSeverity, EventDraft, EventPayload, TrackingEvent};
use crate::journey::Journey;
use crate::metadata::EventMetadata;
use crate::store::{FailedBatchStore, PersistentStore};
use crate::transport::{BatchTransport, BeaconTransport, NoopBeacon};
use crate::types::{EventId, OrderingSessionId, SessionId, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// The resolved session state, fixed for the tracker's lifetime.
#[derive(Debug, Clone)]
struct Session {
    session_id: SessionId,
    ordering_session_id: Option<OrderingSessionId>,
    started_at: Timestamp,
}

struct Inner {
    config: RwLock<Arc<TrackingConfig>>,
    buffer: Mutex<Vec<TrackingEvent>>,
    journey: Mutex<Journey>,
    session: RwLock<Option<Session>>,
    persistence: FailedBatchStore,
    transport: Arc<dyn BatchTransport>,
    beacon: Arc<dyn BeaconTransport>,
    context: Arc<dyn TrackingContext>,
    clock: Arc<dyn Clock>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
    initialized: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.flush_task.lock().take() {
            task.abort();
        }
    }
}

/// Builder for [`EventTracker`].
///
/// The persistent store and batch transport are required; everything else
/// has a sensible headless default.
pub struct EventTrackerBuilder {
    config: TrackingConfig,
    store: Arc<dyn PersistentStore>,
    transport: Arc<dyn BatchTransport>,
    beacon: Arc<dyn BeaconTransport>,
    context: Arc<dyn TrackingContext>,
    clock: Arc<dyn Clock>,
}

impl EventTrackerBuilder {
    /// Overrides the default configuration.
    #[must_use]
    pub fn config(mut self, config: TrackingConfig) -> Self {
        self.config = config;
        self
    }

    /// Supplies the unload beacon transport.
    #[must_use]
    pub fn beacon(mut self, beacon: Arc<dyn BeaconTransport>) -> Self {
        self.beacon = beacon;
        self
    }

    /// Supplies the ambient context provider.
    #[must_use]
    pub fn context(mut self, context: Arc<dyn TrackingContext>) -> Self {
        self.context = context;
        self
    }

    /// Supplies the wall clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the tracker. Call [`EventTracker::initialize`] before tracking.
    pub fn build(self) -> EventTracker {
        EventTracker {
            inner: Arc::new(Inner {
                config: RwLock::new(Arc::new(self.config)),
                buffer: Mutex::new(Vec::new()),
                journey: Mutex::new(Journey::new()),
                session: RwLock::new(None),
                persistence: FailedBatchStore::new(self.store),
                transport: self.transport,
                beacon: self.beacon,
                context: self.context,
                clock: self.clock,
                flush_task: Mutex::new(None),
                initialized: AtomicBool::new(false),
            }),
        }
    }
}

/// The event-tracking service.
///
/// Cloning is cheap and shares all state; hand clones to whatever subsystems
/// need to call [`track`](Self::track).
#[derive(Clone)]
pub struct EventTracker {
    inner: Arc<Inner>,
}

impl EventTracker {
    /// Starts building a tracker from its two required capabilities.
    pub fn builder(
        store: Arc<dyn PersistentStore>,
        transport: Arc<dyn BatchTransport>,
    ) -> EventTrackerBuilder {
        EventTrackerBuilder {
            config: TrackingConfig::default(),
            store,
            transport,
            beacon: Arc::new(NoopBeacon),
            context: Arc::new(StaticContext::default()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Initializes the tracker. Idempotent; a second call is a no-op.
    ///
    /// Resolves (or creates and persists) the stable session id, resolves the
    /// ordering-session correlation id from the injected context, starts the
    /// periodic flush task, re-submits any previously persisted failed
    /// batches, and emits a synthetic `SESSION_START` event.
    pub async fn initialize(&self) {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        let session_id = match self.inner.persistence.load_session_id().await {
            Ok(Some(id)) => id,
            Ok(None) => {
                let id = SessionId::generate();
                if let Err(e) = self.inner.persistence.save_session_id(&id).await {
                    warn!(error = %e, "failed to persist session id");
                }
                id
            }
            Err(e) => {
                warn!(error = %e, "failed to read persisted session id");
                SessionId::generate()
            }
        };

        let session = Session {
            session_id,
            ordering_session_id: self.inner.context.ordering_session(),
            started_at: self.inner.clock.now(),
        };
        debug!(session_id = %session.session_id, "tracker initialized");
        *self.inner.session.write() = Some(session);

        self.spawn_flush_timer();
        self.recover_persisted_batches().await;

        let referrer = self.inner.context.snapshot().referrer;
        self.track(EventPayload::SessionStart { referrer });
    }

    /// Records one event.
    ///
    /// No-op when tracking is disabled or the tracker is not initialized.
    /// The event id is generated if absent, the metadata envelope is always
    /// computed fresh (caller-supplied metadata does not exist by
    /// construction), and the event is appended to the buffer tail. Reaching
    /// the configured batch size triggers an immediate flush.
    pub fn track(&self, draft: impl Into<EventDraft>) {
        let config = self.current_config();
        if !config.enabled {
            return;
        }
        let Some(session) = self.inner.session.read().clone() else {
            return;
        };
        let draft = draft.into();

        let event = TrackingEvent {
            id: draft.id.unwrap_or_else(EventId::new),
            category: draft
                .category
                .unwrap_or_else(|| draft.payload.default_category()),
            metadata: self.fresh_metadata(&session),
            payload: draft.payload,
        };

        if config.debug_mode {
            debug!(kind = event.payload.kind_name(), "captured event");
        } else {
            trace!(kind = event.payload.kind_name(), "captured event");
        }

        self.inner.journey.lock().record(&event.payload);

        let should_flush = {
            let mut buffer = self.inner.buffer.lock();
            buffer.push(event);
            buffer.len() >= config.batch_size.into_inner()
        };
        if should_flush {
            self.flush();
        }
    }

    /// Captures a runtime error with journey context and flushes immediately.
    ///
    /// This is the entry point for the application's top-level error
    /// boundary: the report carries the last journey entries and an arbitrary
    /// store-state snapshot for postmortem analysis.
    pub fn track_error(
        &self,
        message: impl Into<String>,
        stack: Option<String>,
        severity: ErrorSeverity,
        state_snapshot: serde_json::Value,
    ) {
        let journey = self.inner.journey.lock().entries();
        self.track(EventPayload::Error {
            message: message.into(),
            stack,
            severity,
            journey,
            state_snapshot,
        });
        self.flush();
    }

    /// Drains the buffer into an immutable batch and sends it asynchronously.
    ///
    /// No-op on an empty buffer. The buffer swap happens under the lock, so
    /// an event tracked concurrently lands either in this batch or the next,
    /// never both and never neither.
    pub fn flush(&self) {
        if let Some(batch) = self.drain_buffer() {
            debug!(batch_id = %batch.batch_id, count = batch.count, "flushing batch");
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                Self::send_with_retries(inner, batch).await;
            });
        }
    }

    /// Handles the host's unload signal.
    ///
    /// Synchronously emits a `SESSION_END` event into the buffer, then hands
    /// whatever is buffered to the beacon transport. Nothing here awaits;
    /// the host may terminate before any future would resolve.
    pub fn handle_unload(&self) {
        let Some(session) = self.inner.session.read().clone() else {
            return;
        };
        if self.current_config().enabled {
            let payload = EventPayload::SessionEnd {
                duration_ms: self.inner.clock.now().millis_since(session.started_at),
                journey_length: self.inner.journey.lock().len(),
            };
            let event = TrackingEvent {
                id: EventId::new(),
                category: payload.default_category(),
                metadata: self.fresh_metadata(&session),
                payload,
            };
            self.inner.buffer.lock().push(event);
        }

        if let Some(batch) = self.drain_buffer() {
            debug!(batch_id = %batch.batch_id, count = batch.count, "unload beacon send");
            self.inner.beacon.send(&batch);
        }
    }

    /// Tears the tracker down: stops the flush timer, sends any buffered
    /// remainder, and clears the initialized flag.
    ///
    /// Safe to call with an empty buffer or on a never-initialized tracker.
    /// A retry already scheduled by an in-flight send may still fire
    /// afterwards; sends are idempotent by batch id, so that is benign.
    pub fn destroy(&self) {
        if let Some(task) = self.inner.flush_task.lock().take() {
            task.abort();
        }
        self.flush();
        *self.inner.session.write() = None;
        self.inner.initialized.store(false, Ordering::SeqCst);
    }

    /// Replaces the configuration wholesale.
    ///
    /// The tracker re-reads the current value at every decision point, so the
    /// new value takes effect from the next capture, flush tick, or retry
    /// cycle.
    pub fn update_config(&self, config: TrackingConfig) {
        *self.inner.config.write() = Arc::new(config);
    }

    /// The resolved session id, once initialized.
    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.session.read().as_ref().map(|s| s.session_id.clone())
    }

    /// The current journey entries, oldest first.
    pub fn journey(&self) -> Vec<String> {
        self.inner.journey.lock().entries()
    }

    /// Number of events currently buffered.
    pub fn buffered(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Whether `initialize` has completed and `destroy` has not.
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    fn current_config(&self) -> Arc<TrackingConfig> {
        Arc::clone(&self.inner.config.read())
    }

    fn fresh_metadata(&self, session: &Session) -> EventMetadata {
        let snapshot = self.inner.context.snapshot();
        EventMetadata {
            session_id: session.session_id.clone(),
            ordering_session_id: session.ordering_session_id.clone(),
            user_id: snapshot.user_id,
            restaurant_id: snapshot.restaurant_id,
            cart_id: snapshot.cart_id,
            timestamp: self.inner.clock.now(),
            device_info: snapshot.device_info,
            current_route: snapshot.current_route,
            previous_route: snapshot.previous_route,
            referrer: snapshot.referrer,
        }
    }

    fn drain_buffer(&self) -> Option<EventBatch> {
        let events = {
            let mut buffer = self.inner.buffer.lock();
            if buffer.is_empty() {
                return None;
            }
            std::mem::take(&mut *buffer)
        };
        Some(EventBatch::new(events, self.inner.clock.now()))
    }

    fn spawn_flush_timer(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            loop {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let interval = inner.config.read().flush_interval;
                drop(inner);
                tokio::time::sleep(interval.into()).await;

                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let tracker = Self { inner };
                tracker.flush();
            }
        });
        *self.inner.flush_task.lock() = Some(task);
    }

    /// Re-submits every persisted failed batch independently.
    ///
    /// A batch that fails again re-enters the persisted list through the
    /// normal send failure path.
    async fn recover_persisted_batches(&self) {
        let batches = match self.inner.persistence.load_failed_batches().await {
            Ok(batches) => batches,
            Err(e) => {
                warn!(error = %e, "failed to load persisted batches for recovery");
                return;
            }
        };
        if batches.is_empty() {
            return;
        }
        debug!(count = batches.len(), "recovering persisted failed batches");
        for batch in batches {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                Self::send_with_retries(inner, batch).await;
            });
        }
    }

    /// The send loop: initial attempt plus up to `max_retries` retries on the
    /// linear backoff schedule (`retry_delay * attempt`). Configuration is
    /// re-read on every cycle.
    async fn send_with_retries(inner: Arc<Inner>, batch: EventBatch) {
        let mut attempt: u32 = 0;
        loop {
            match inner.transport.send(&batch).await {
                Ok(()) => {
                    debug!(batch_id = %batch.batch_id, "batch delivered");
                    if inner.config.read().enable_local_storage {
                        if let Err(e) = inner.persistence.remove_failed_batch(batch.batch_id).await
                        {
                            warn!(error = %e, "failed to prune delivered batch from storage");
                        }
                    }
                    return;
                }
                Err(e) => {
                    Self::note_delivery_failure(&inner, &batch, &e, attempt).await;
                    let config = Arc::clone(&inner.config.read());
                    if attempt >= config.max_retries {
                        debug!(
                            batch_id = %batch.batch_id,
                            retries = attempt,
                            "giving up on batch; left persisted for recovery"
                        );
                        return;
                    }
                    attempt += 1;
                    tokio::time::sleep(config.retry_delay.for_attempt(attempt)).await;
                }
            }
        }
    }

    async fn note_delivery_failure(
        inner: &Arc<Inner>,
        batch: &EventBatch,
        error: &TransportError,
        attempt: u32,
    ) {
        warn!(
            batch_id = %batch.batch_id,
            attempt,
            error = %error,
            "batch delivery failed"
        );
        if inner.config.read().enable_local_storage {
            if let Err(e) = inner.persistence.save_failed_batch(batch).await {
                warn!(error = %e, "failed to persist failed batch");
            }
        }
    }
}

impl std::fmt::Debug for EventTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTracker")
            .field("initialized", &self.is_initialized())
            .field("buffered", &self.buffered())
            .finish_non_exhaustive()
    }
}
