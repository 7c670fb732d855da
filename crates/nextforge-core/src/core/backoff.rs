// crates/nextforge-core/src/core/backoff.rs
// ============================================================================
// Module: Nextforge Retry Backoff
// Description: Bounded exponential backoff, sleep injection, and cancellation.
// Purpose: Share one retry policy across license, resolution, and connect.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Transient failures (network failures, timeouts, unavailable services,
//! unreachable stores) are retried with [`BackoffPolicy`]: a bounded attempt
//! count and a doubling delay capped at a maximum. Delays go through a
//! [`Sleeper`] so callers can observe them without sleeping, and every retry
//! loop checks a [`Cancellation`] before each attempt so an expired startup
//! deadline stops work instead of resuming it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

// ============================================================================
// SECTION: Backoff Policy
// ============================================================================

/// Bounded exponential backoff.
///
/// # Invariants
/// - `max_attempts >= 1`; the first attempt is never delayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts including the first.
    max_attempts: u32,
    /// Delay before the first retry.
    initial_delay: Duration,
    /// Upper bound for any single delay.
    max_delay: Duration,
}

impl BackoffPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    /// Policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Returns the total attempt budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay to wait after failed attempt number `attempt`
    /// (1-based) before the next one.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1_u32 << exponent;
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

// ============================================================================
// SECTION: Sleeping
// ============================================================================

/// Blocking sleep abstraction.
pub trait Sleeper: Send + Sync {
    /// Blocks for the given duration.
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Sleeper that records requested delays without blocking.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    /// Delays requested so far.
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Creates an empty recording sleeper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded delays.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|delays| delays.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    /// Set once cancellation is requested.
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_and_cap() {
        let policy =
            BackoffPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(350));
        assert_eq!(policy.delay_after(40), Duration::from_millis(350));
    }

    #[test]
    fn zero_attempts_clamp_to_one() {
        let policy = BackoffPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn recording_sleeper_captures_delays() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_millis(5));
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(5)]);
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = Cancellation::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
