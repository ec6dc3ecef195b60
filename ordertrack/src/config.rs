//! Tracking configuration.
//!
//! `TrackingConfig` is an immutable value. Updating configuration replaces
//! the whole value; the tracker re-reads the current value at every decision
//! point (capture, flush trigger, each retry cycle), so partial-update races
//! cannot occur.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Buffer size that triggers an immediate flush.
/// Must be at least 1; a threshold of 0 would flush empty batches forever.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize
    )
)]
pub struct BatchSize(usize);

impl Default for BatchSize {
    fn default() -> Self {
        Self::try_new(10).unwrap()
    }
}

/// Milliseconds between timer-driven flushes.
/// Valid range: 100ms to 10 minutes.
#[nutype(
    validate(greater_or_equal = 100, less_or_equal = 600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize
    )
)]
pub struct FlushIntervalMs(u64);

impl Default for FlushIntervalMs {
    fn default() -> Self {
        Self::try_new(30_000).unwrap() // 30 seconds
    }
}

impl From<FlushIntervalMs> for Duration {
    fn from(interval: FlushIntervalMs) -> Self {
        Self::from_millis(interval.into_inner())
    }
}

/// Base delay for the linear retry backoff, in milliseconds.
///
/// Attempt `n` (1-based) waits `retry_delay * n`. The backoff is linear, not
/// exponential; that matches the observed production behavior and is kept
/// deliberately.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize
    )
)]
pub struct RetryDelayMs(u64);

impl Default for RetryDelayMs {
    fn default() -> Self {
        Self::try_new(2_000).unwrap() // 2 seconds
    }
}

impl RetryDelayMs {
    /// The delay before retry attempt `attempt` (1-based).
    pub fn for_attempt(self, attempt: u32) -> Duration {
        Duration::from_millis(self.into_inner().saturating_mul(u64::from(attempt)))
    }
}

/// Tracking pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Global kill switch: when false, no event capture or flush occurs.
    pub enabled: bool,

    /// Buffer length that triggers an immediate flush.
    pub batch_size: BatchSize,

    /// Interval between timer-driven flushes.
    pub flush_interval: FlushIntervalMs,

    /// How many retries a failed send is given before the batch is left
    /// persisted for the next initialization to recover.
    pub max_retries: u32,

    /// Base delay for the linear retry backoff.
    pub retry_delay: RetryDelayMs,

    /// Whether failed batches persist to durable storage.
    pub enable_local_storage: bool,

    /// Verbose diagnostic logging only; no behavioral effect.
    pub debug_mode: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: BatchSize::default(),
            flush_interval: FlushIntervalMs::default(),
            max_retries: 3,
            retry_delay: RetryDelayMs::default(),
            enable_local_storage: true,
            debug_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TrackingConfig::default();
        assert!(config.enabled);
        assert_eq!(config.batch_size.into_inner(), 10);
        assert_eq!(config.flush_interval.into_inner(), 30_000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay.into_inner(), 2_000);
        assert!(config.enable_local_storage);
        assert!(!config.debug_mode);
    }

    #[test]
    fn batch_size_rejects_zero() {
        assert!(BatchSize::try_new(0).is_err());
        assert!(BatchSize::try_new(1).is_ok());
    }

    #[test]
    fn retry_backoff_is_linear_in_the_attempt_number() {
        let delay = RetryDelayMs::try_new(2_000).unwrap();
        assert_eq!(delay.for_attempt(1), Duration::from_millis(2_000));
        assert_eq!(delay.for_attempt(2), Duration::from_millis(4_000));
        assert_eq!(delay.for_attempt(3), Duration::from_millis(6_000));
    }

    #[test]
    fn flush_interval_converts_to_duration() {
        let interval = FlushIntervalMs::try_new(5_000).unwrap();
        assert_eq!(Duration::from(interval), Duration::from_secs(5));
    }
}
