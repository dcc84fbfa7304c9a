//! Runtime core: task execution, composition and shutdown.
//!
//! - [`runner`]: runs tasks under deadline-bounded, registered contexts;
//! - [`coordinator`]: owns every component and the join barrier;
//! - [`builder`]: assembles a coordinator from config, broker and observers;
//! - [`shutdown`]: single-fire shutdown signal and OS signal handling.

mod builder;
mod coordinator;
mod runner;
mod shutdown;

pub use builder::CoordinatorBuilder;
pub use coordinator::Coordinator;
pub use runner::{RunSummary, TaskOutcome, TaskRunner};
pub use shutdown::{wait_for_shutdown_signal, ShutdownSignal};
