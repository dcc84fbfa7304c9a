//! # Liveness tracking.
//!
//! - [`AtomicScoreSet`] conditional sorted-set writes, each one atomic broker step
//! - [`HeartbeatManager`] owns one identity's liveness record
//! - [`HealthChecker`] probes the broker and fires the shutdown signal once
//!
//! ```text
//!   HeartbeatManager ──insert/update/remove──► AtomicScoreSet ──► Broker (ZSET)
//!   HealthChecker ──────────── ping ──────────────────────────► Broker
//!         └── first failure ──► ShutdownSignal::fire ──► Coordinator cancels everything
//! ```

mod health;
mod heartbeat;
mod score_set;

pub use health::HealthChecker;
pub use heartbeat::HeartbeatManager;
pub use score_set::AtomicScoreSet;
