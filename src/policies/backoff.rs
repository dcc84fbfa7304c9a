//! # Exponential reconnect backoff.
//!
//! Attempt `n` (0-based) waits `first * factor^n`, capped at `max`, then the
//! jitter policy is applied. The base is derived from the attempt number only,
//! so jitter never feeds into later delays.
//!
//! ```rust
//! use std::time::Duration;
//! use pulsevisor::{Backoff, BackoffPolicy, JitterPolicy};
//!
//! let policy = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(1),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//! let mut backoff = Backoff::new(policy);
//! assert_eq!(backoff.next_delay(), Duration::from_millis(100));
//! assert_eq!(backoff.next_delay(), Duration::from_millis(200));
//! backoff.reset();
//! assert_eq!(backoff.next_delay(), Duration::from_millis(100));
//! ```

use std::time::Duration;

use crate::policies::JitterPolicy;

/// Growth parameters of the wait between reconnect attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Wait before the first retry.
    pub first: Duration,
    /// Upper bound of any wait, before jitter.
    pub max: Duration,
    /// Growth per attempt; `1.0` keeps the wait constant.
    pub factor: f64,
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// 100ms doubling up to 5s, equal jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        }
    }
}

impl BackoffPolicy {
    /// Wait before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        let base = if secs.is_finite() && secs >= 0.0 && secs < self.max.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        };
        self.jitter.apply(base)
    }
}

/// Attempt counter driving a [`BackoffPolicy`].
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Returns the wait for the current attempt and advances the counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Consecutive failures since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Starts over from `first`.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
