//! Runtime events: types and broadcast bus.
//!
//! Every component publishes what it does (renewals, probe failures,
//! dispatched cancellations, retry sweeps) as an [`Event`] on the [`Bus`].
//! The coordinator forwards them to the [`ObserverSet`](crate::ObserverSet).
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
