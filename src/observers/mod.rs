//! # Event observers.
//!
//! [`Observe`] is the extension point for reacting to runtime [`Event`](crate::Event)s
//! (metrics, alerting, audit). Observers are driven by the [`ObserverSet`], one
//! worker and one bounded queue per observer, so a slow observer never blocks
//! the components that publish.
//!
//! ```text
//!   Bus ──► Coordinator::observer_listener ──► ObserverSet::emit
//!                                                ├──► [queue O1] ─► worker ─► on_event()
//!                                                └──► [queue ON] ─► worker ─► on_event()
//! ```

mod observe;
mod set;

pub use observe::Observe;
pub use set::ObserverSet;
