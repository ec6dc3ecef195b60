//! `OrderTrack` - client-side telemetry core for a conversational
//! food-ordering application.
//!
//! This library implements the event-tracking pipeline behind the ordering
//! assistant: an in-memory event buffer with size- and time-based flush
//! triggers, at-least-once batch delivery with local persistence and linear
//! retry backoff, a best-effort unload send, and the TTL-guarded order state
//! (cart, pending payments) the pipeline observes.
//!
//! The tracker is an explicitly constructed, injectable service. All ambient
//! capabilities (durable storage, delivery transport, wall clock, page
//! context) are traits supplied at construction time, so the same pipeline
//! runs unchanged in production, headless, and test environments.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod cart;
pub mod clock;
pub mod config;
pub mod context;
pub mod errors;
pub mod event;
pub mod journey;
pub mod metadata;
pub mod payment;
pub mod store;
pub mod tracker;
pub mod transport;
pub mod types;

pub use batch::EventBatch;
pub use cart::CartStore;
pub use config::TrackingConfig;
pub use event::{EventDraft, EventPayload, TrackingEvent};
pub use payment::PendingPaymentRegistry;
pub use tracker::EventTracker;
