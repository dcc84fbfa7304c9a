//! # Cooperative cancellation.
//!
//! Task identities map to cancellation controls in a shared
//! [`CancellationRegistry`]. The [`TaskRunner`](crate::TaskRunner) writes and
//! deletes entries, the [`CancellationSubscriber`] reads them and invokes the
//! control when a request arrives on the broker channel.
//!
//! ```text
//!  publisher ──PUBLISH cancel "7"──► broker ──► CancellationSubscriber
//!                                                    │ lookup(7)
//!                                                    ▼
//!  TaskRunner ──register(7, token)──► CancellationRegistry ──► token.cancel()
//!      ▲                                                         │
//!      └────────────── remove(7) when the context concludes ◄────┘
//! ```

mod control;
mod id;
mod registry;
mod subscriber;

pub use control::{Cancel, CancelFn, CancelRef};
pub use id::{ParseTaskIdError, TaskId};
pub use registry::CancellationRegistry;
pub use subscriber::{request_cancel, CancellationSubscriber, SubscriberState};
