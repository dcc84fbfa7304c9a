//! # Bounded fixed-cadence retry of transiently failing operations.
//!
//! ```text
//!  producers ──RetryQueue::submit──► [bounded mpsc] ──► RetryScheduler
//!                                                        │ working set
//!                                    every interval ◄────┤
//!                                    attempt each due item once:
//!                                      Ok        ─► dropped (RetrySucceeded)
//!                                      Err       ─► kept    (RetryFailed)
//!                                      cap hit   ─► dropped (RetryExhausted)
//! ```
//!
//! The first sweep happens one interval after the scheduler starts. Items
//! whose `not_before` lies in the future are kept without an attempt.

mod item;
mod scheduler;

pub use item::{Operation, OperationFn, OperationRef, RetryItem};
pub use scheduler::{RetryQueue, RetryScheduler};
