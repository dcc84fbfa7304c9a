//! Reconnect delay policies.
//!
//! - [`BackoffPolicy`] how the wait between reconnect attempts grows
//! - [`JitterPolicy`] how much randomness is mixed into each wait
//! - [`Backoff`] attempt counter over a policy, reset after a success
//!
//! Used by the cancellation subscriber when its subscription cannot be
//! established or is lost.

mod backoff;
mod jitter;

pub use backoff::{Backoff, BackoffPolicy};
pub use jitter::JitterPolicy;
