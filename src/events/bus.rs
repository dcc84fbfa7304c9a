//! In-process fan-out of [`Event`]s.
//!
//! ```text
//!   HeartbeatManager ──┐
//!   HealthChecker    ──┤
//!   Subscriber       ──┼──► Bus ──► observer_listener ──► ObserverSet
//!   TaskRunner       ──┤
//!   RetryScheduler   ──┘
//! ```
//!
//! Publishing never waits. Events sent while nobody listens are gone, and a
//! receiver that falls more than `capacity` events behind gets
//! `RecvError::Lagged(n)` and resumes at the oldest retained event.

use tokio::sync::broadcast;

use super::event::Event;

const DEFAULT_CAPACITY: usize = 1024;

/// Cloneable handle shared by every publisher.
#[derive(Clone, Debug)]
pub struct Bus {
    sender: broadcast::Sender<Event>,
}

impl Bus {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, ev: Event) {
        // Err only means there is no receiver right now.
        let _ = self.sender.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
