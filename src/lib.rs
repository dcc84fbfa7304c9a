//! # pulsevisor
//!
//! **Pulsevisor** keeps a pool of worker processes visible and stoppable
//! through a shared Redis-like broker.
//!
//! Every process:
//! - renews a liveness record (sorted set, score = last renewal in Unix
//!   seconds) and removes it on shutdown;
//! - probes the broker and shuts itself down once it becomes unreachable;
//! - runs tasks under deadline-bounded contexts, each registered under a
//!   caller-assigned id;
//! - listens on a pub/sub channel for task ids and cancels the matching local
//!   task, cooperatively;
//! - retries transiently failing operations on a fixed cadence.
//!
//! ## Architecture
//! ```text
//!                         ┌────────────────────────────┐
//!                         │   Broker (Redis / memory)  │
//!                         │  ZSET liveness   PUBSUB    │
//!                         └──▲──────▲────────────┬─────┘
//!          insert/update/rem │      │ PING       │ cancel "<id>"
//! ┌──────────────────────────┼──────┼────────────┼──────────────────────┐
//! │ Coordinator              │      │            ▼                      │
//! │   HeartbeatManager ──────┘  HealthChecker  CancellationSubscriber   │
//! │                                 │ fire          │ lookup(id).cancel │
//! │                                 ▼               ▼                   │
//! │                          ShutdownSignal   CancellationRegistry      │
//! │                                 │               ▲ register/remove   │
//! │                 runtime token ◄─┘          TaskRunner ◄── submit()  │
//! │                                                                     │
//! │   RetryScheduler ◄── RetryQueue::submit()                           │
//! │                                                                     │
//! │   Bus (broadcast Event) ──► observer_listener ──► ObserverSet       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                                   |
//! |-------------------|----------------------------------------------------------|------------------------------------------------------|
//! | **Liveness**      | Atomic sorted-set writes, heartbeat, broker probe.       | [`AtomicScoreSet`], [`HeartbeatManager`], [`HealthChecker`] |
//! | **Cancellation**  | Registry of controls and the channel subscriber.         | [`CancellationRegistry`], [`CancellationSubscriber`], [`Cancel`] |
//! | **Tasks**         | Deadline-bounded task execution.                         | [`Task`], [`TaskFn`], [`TaskSpec`], [`TaskRunner`]   |
//! | **Retry**         | Fixed-cadence retry buffer.                              | [`RetryScheduler`], [`RetryQueue`], [`RetryItem`]    |
//! | **Composition**   | One lifetime for all of the above.                       | [`Coordinator`], [`ShutdownSignal`]                  |
//! | **Observability** | Typed runtime events fanned out to observers.            | [`Event`], [`Observe`]                               |
//! | **Broker**        | Redis adapter and an in-memory broker for tests.         | [`Broker`], [`RedisBroker`], [`MemoryBroker`]        |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use pulsevisor::{Config, Coordinator, MemoryBroker, TaskError, TaskFn, TaskRef, TaskSpec};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.grace = Duration::from_secs(1).into();
//!
//!     let coordinator = Coordinator::builder(cfg)
//!         .with_broker(Arc::new(MemoryBroker::new()))
//!         .with_identity("worker-1")
//!         .build()?;
//!
//!     let report: TaskRef = TaskFn::arc("report", |ctx: CancellationToken| async move {
//!         if ctx.is_cancelled() {
//!             return Err(TaskError::Canceled);
//!         }
//!         Ok(())
//!     });
//!
//!     let handle = {
//!         let c = Arc::clone(&coordinator);
//!         tokio::spawn(async move { c.run(vec![TaskSpec::new(1u64, report)]).await })
//!     };
//!
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!     coordinator.shutdown();
//!     handle.await??;
//!     Ok(())
//! }
//! ```

mod broker;
mod cancel;
mod config;
mod core;
mod error;
mod events;
mod liveness;
mod observers;
mod policies;
mod retry;
mod tasks;

// ---- Public re-exports ----

pub use broker::{Broker, BrokerRef, MemoryBroker, RedisBroker, ScoreCall, ScoreOp, Subscription};
pub use cancel::{
    request_cancel, Cancel, CancelFn, CancelRef, CancellationRegistry, CancellationSubscriber,
    ParseTaskIdError, SubscriberState, TaskId,
};
pub use config::{Config, EnvMsDuration};
pub use core::{
    wait_for_shutdown_signal, Coordinator, CoordinatorBuilder, RunSummary, ShutdownSignal,
    TaskOutcome, TaskRunner,
};
pub use error::{BrokerError, RegistryError, RuntimeError, SubmitError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use liveness::{AtomicScoreSet, HealthChecker, HeartbeatManager};
pub use observers::{Observe, ObserverSet};
pub use policies::{Backoff, BackoffPolicy, JitterPolicy};
pub use retry::{Operation, OperationFn, OperationRef, RetryItem, RetryQueue, RetryScheduler};
pub use tasks::{Task, TaskFn, TaskRef, TaskSpec};
