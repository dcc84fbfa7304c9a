use async_trait::async_trait;

use crate::events::Event;

/// Receives every runtime [`Event`] of a coordinator.
///
/// Each observer gets its own worker and bounded queue, so a slow `on_event`
/// only holds back that observer. When its queue is full the event is dropped
/// for it and `ObserverOverflow` is published instead.
///
/// ```rust
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use async_trait::async_trait;
/// use pulsevisor::{Event, EventKind, Observe};
///
/// #[derive(Default)]
/// struct MissedBeats(AtomicU64);
///
/// #[async_trait]
/// impl Observe for MissedBeats {
///     async fn on_event(&self, ev: &Event) {
///         if ev.kind == EventKind::HeartbeatFailed {
///             self.0.fetch_add(1, Ordering::Relaxed);
///         }
///     }
///
///     fn name(&self) -> &'static str {
///         "missed-beats"
///     }
/// }
/// ```
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Used in overflow events and worker logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Bound of this observer's queue.
    fn queue_capacity(&self) -> usize {
        512
    }
}
