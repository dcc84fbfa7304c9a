//! # ObserverSet: non-blocking fan-out over multiple observers
//!
//! ## What it guarantees
//! - `emit(&Event)` returns immediately.
//! - Per-observer FIFO (queue order).
//! - Panics inside observers are caught, logged and reported on the bus.
//!
//! ## What it does **not** guarantee
//! - No global ordering across different observers.
//! - No retries on per-observer queue overflow (events are dropped for that observer).

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, warn};

use crate::events::{Bus, Event};
use crate::observers::Observe;

/// Per-observer channel metadata.
struct ObserverChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out of runtime events to observers, one bounded queue and worker each.
pub struct ObserverSet {
    channels: Vec<ObserverChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl ObserverSet {
    /// Creates a new set and spawns one worker task per observer.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn Observe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(observers.len());
        let mut workers = Vec::with_capacity(observers.len());

        for obs in observers {
            let cap = obs.queue_capacity().max(1);
            let name = obs.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = obs.on_event(ev.as_ref());

                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = if let Some(msg) = panic_err.downcast_ref::<&'static str>() {
                            (*msg).to_string()
                        } else if let Some(msg) = panic_err.downcast_ref::<String>() {
                            msg.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        error!(observer = obs.name(), info = %info, "observer panicked");
                        bus_for_worker.publish(Event::observer_panicked(obs.name(), info));
                    }
                }
            });
            channels.push(ObserverChannel { name, sender: tx });
            workers.push(handle);
        }

        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Queues `event` for every observer without waiting.
    ///
    /// Observer-internal events (`ObserverOverflow`, `ObserverPanicked`) stay
    /// on the bus only. Fanning them back out would let a failing observer
    /// trigger itself again.
    pub fn emit(&self, event: &Event) {
        if event.is_observer_internal() {
            return;
        }
        let event = Arc::new(event.clone());

        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            warn!(observer = channel.name, reason, "observer dropped event");
            self.bus
                .publish(Event::observer_overflow(channel.name, reason));
        }
    }

    /// Closes all queues and waits for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }

    /// True if there are no observers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}
