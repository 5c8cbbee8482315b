//! Backoff schedule and clock used while waiting for the registry lock

use std::time::{Duration, Instant};

/// Source of time for lock waits
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::time` and `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Bounded exponential backoff for `acquire_exclusive_section`
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total time to wait before giving up with a lock timeout
    pub timeout: Duration,
    /// Delay after the first failed attempt
    pub initial_backoff: Duration,
    /// Upper bound for a single delay
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(1.0) as u64)
    }

    /// Delay for `attempt`, shortened so the wait never overruns `deadline`.
    /// `None` once the deadline has passed.
    pub fn next_delay(&self, attempt: u32, now: Instant, deadline: Instant) -> Option<Duration> {
        if now >= deadline {
            return None;
        }
        Some(self.backoff(attempt).min(deadline - now))
    }
}
