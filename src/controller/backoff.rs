//! # Exponential Backoff
//!
//! Capped exponential backoff for requeueing objects whose stages hit
//! transient failures.
//!
//! Sequence with a 2s minimum and 60s cap: 2s, 4s, 8s, 16s, 32s, 60s, 60s, ...
//!
//! ## Usage
//!
//! ```rust
//! use octavia_controller::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(60));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
//! ```

use std::time::Duration;

/// Exponential backoff calculator
///
/// Doubles on every call until `max` is reached. State is kept per object by
/// the reconciler so one failing object never slows down another.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// First delay, and the delay after a reset
    min: Duration,
    /// Upper bound for every delay
    max: Duration,
    /// Delay returned by the next call
    current: Duration,
}

impl ExponentialBackoff {
    /// Create a new backoff starting at `min` and capped at `max`
    ///
    /// A `max` below `min` is raised to `min`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(30));
        let expected = [1, 2, 4, 8, 16, 30, 30];
        for secs in expected {
            assert_eq!(backoff.next_backoff(), Duration::from_secs(secs));
        }
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(60));
        backoff.next_backoff();
        backoff.next_backoff();
        backoff.next_backoff();
        backoff.reset();
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
    }

    #[test]
    fn test_max_below_min_is_clamped() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
    }

    #[test]
    fn test_no_overflow_with_large_values() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(u64::MAX / 2), Duration::MAX);
        for _ in 0..5 {
            let _ = backoff.next_backoff();
        }
        assert!(backoff.next_backoff() >= Duration::from_secs(u64::MAX / 2));
    }
}
