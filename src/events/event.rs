//! # Runtime events emitted by the coordinator and its components.
//!
//! [`EventKind`] classifies events by the component that emits them:
//! - **Liveness**: heartbeat renewals and removal, broker probe failures
//! - **Cancellation**: subscription state, dispatched and unknown cancellations
//! - **Tasks**: registration, rejection, conclusion
//! - **Retry**: per-item outcomes of a sweep
//! - **Shutdown**: shutdown requested, all stopped, grace exceeded
//! - **Observers**: overflow and panics inside observer workers
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use pulsevisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskConcluded)
//!     .with_subject("42")
//!     .with_reason("timed out")
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::TaskConcluded);
//! assert_eq!(ev.subject.as_deref(), Some("42"));
//! assert_eq!(ev.timeout_ms, Some(5000));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Liveness ===
    /// First renewal created the liveness record.
    ///
    /// Sets `subject` (identity), `score`.
    HeartbeatCreated,

    /// Liveness record renewed.
    ///
    /// Sets `subject` (identity), `score`.
    HeartbeatRenewed,

    /// Renewal found no record to update (it was removed by someone else).
    ///
    /// Sets `subject` (identity).
    HeartbeatMissing,

    /// A renewal or removal failed against the broker.
    ///
    /// Sets `subject` (identity), `reason`.
    HeartbeatFailed,

    /// Liveness record removed on shutdown.
    ///
    /// Sets `subject` (identity).
    HeartbeatRemoved,

    /// Broker reachability probe failed.
    ///
    /// Sets `reason`.
    ProbeFailed,

    // === Cancellation ===
    /// Subscription on the cancellation channel confirmed.
    ///
    /// Sets `subject` (channel).
    SubscriptionEstablished,

    /// Subscription attempt failed or an established one ended.
    ///
    /// Sets `subject` (channel), `reason`, `delay_ms` (wait before reconnecting).
    SubscriptionLost,

    /// A cancellation control was invoked for a task.
    ///
    /// Sets `subject` (task id).
    CancelDispatched,

    /// A cancellation request referenced no registered task.
    ///
    /// Sets `subject` (task id or raw payload), `reason`.
    CancelUnknown,

    // === Tasks ===
    /// Task registered its cancellation control and started.
    ///
    /// Sets `subject` (task id), `timeout_ms` when a deadline applies.
    TaskRegistered,

    /// Task was not started because its id is already registered.
    ///
    /// Sets `subject` (task id), `reason`.
    TaskRejected,

    /// Task context concluded and the registry entry was removed.
    ///
    /// Sets `subject` (task id), `reason` (outcome label).
    TaskConcluded,

    // === Retry ===
    /// A buffered operation succeeded and was dropped from the buffer.
    ///
    /// Sets `subject` (tag), `attempt`.
    RetrySucceeded,

    /// A buffered operation failed again and stays buffered.
    ///
    /// Sets `subject` (tag), `attempt`, `reason`.
    RetryFailed,

    /// A buffered operation reached its attempt cap and was dropped.
    ///
    /// Sets `subject` (tag), `attempt`, `reason`.
    RetryExhausted,

    // === Shutdown ===
    /// Shutdown requested (OS signal, failed probe or explicit request).
    ///
    /// Sets `reason`.
    ShutdownRequested,

    /// All components stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some components did not stop in time.
    GraceExceeded,

    // === Observers ===
    /// Observer dropped an event (queue full or worker closed).
    ///
    /// Sets `subject` (observer name), `reason`.
    ObserverOverflow,

    /// Observer panicked while handling an event.
    ///
    /// Sets `subject` (observer name), `reason`.
    ObserverPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// What the event is about: task id, process identity, channel, retry tag or observer name.
    pub subject: Option<Arc<str>>,
    /// Human-readable reason (errors, outcome labels, overflow details).
    pub reason: Option<Arc<str>>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Deadline in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Delay before the next attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Liveness score written to the broker.
    pub score: Option<i64>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            subject: None,
            reason: None,
            attempt: None,
            timeout_ms: None,
            delay_ms: None,
            score: None,
        }
    }

    /// Attaches a subject.
    #[inline]
    pub fn with_subject(mut self, subject: impl Into<Arc<str>>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a deadline (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(saturating_ms(d));
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(saturating_ms(d));
        self
    }

    /// Attaches a liveness score.
    #[inline]
    pub fn with_score(mut self, score: i64) -> Self {
        self.score = Some(score);
        self
    }

    /// Creates an observer overflow event.
    #[inline]
    pub fn observer_overflow(observer: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::ObserverOverflow)
            .with_subject(observer)
            .with_reason(reason)
    }

    /// Creates an observer panic event.
    #[inline]
    pub fn observer_panicked(observer: &'static str, info: String) -> Self {
        Event::new(EventKind::ObserverPanicked)
            .with_subject(observer)
            .with_reason(info)
    }

    /// True for events emitted by the observer machinery itself.
    #[inline]
    pub fn is_observer_internal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ObserverOverflow | EventKind::ObserverPanicked
        )
    }
}

fn saturating_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::HeartbeatRenewed);
        let b = Event::new(EventKind::HeartbeatRenewed);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_durations_saturate() {
        let ev = Event::new(EventKind::SubscriptionLost).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn test_observer_helpers() {
        let ev = Event::observer_overflow("metrics", "full");
        assert!(ev.is_observer_internal());
        assert_eq!(ev.subject.as_deref(), Some("metrics"));
        assert!(!Event::new(EventKind::CancelDispatched).is_observer_internal());
    }
}
