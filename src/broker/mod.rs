//! # Broker abstraction.
//!
//! The coordinator only needs four things from the shared broker:
//! atomic conditional sorted-set writes, a reachability probe, publish and
//! subscribe. [`Broker`] captures exactly that, with two implementations:
//!
//! - [`RedisBroker`] production adapter over the `redis` crate (Lua scripts,
//!   `PING`, `PUBLISH`, `SUBSCRIBE`)
//! - [`MemoryBroker`] in-process fake with a call log and failure injection

mod memory;
mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::BrokerError;

pub use self::memory::{MemoryBroker, ScoreCall};
pub use self::redis::RedisBroker;

/// Conditional sorted-set operation, executed as one atomic broker step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOp {
    /// Add the member with this score only if it is absent. Replies 1 if added.
    InsertIfAbsent(i64),
    /// Set this score only if the member exists. Replies 1 if updated.
    UpdateIfPresent(i64),
    /// Remove the member. Replies the number removed.
    Remove,
}

impl ScoreOp {
    /// Stable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ScoreOp::InsertIfAbsent(_) => "insert_if_absent",
            ScoreOp::UpdateIfPresent(_) => "update_if_present",
            ScoreOp::Remove => "remove_member",
        }
    }
}

/// Operations the coordinator needs from the shared broker.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Executes a conditional sorted-set operation atomically and returns the integer reply.
    async fn score(&self, key: &str, member: &str, op: ScoreOp) -> Result<i64, BrokerError>;

    /// Lightweight reachability probe.
    async fn ping(&self) -> Result<(), BrokerError>;

    /// Publishes `payload` on `channel`; returns how many subscribers received it.
    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, BrokerError>;

    /// Opens a subscription on `channel`; returns once the broker confirmed it.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError>;
}

/// Shared handle to a broker.
pub type BrokerRef = Arc<dyn Broker>;

/// Confirmed subscription delivering message payloads.
///
/// Dropping it tears the subscription down.
pub struct Subscription {
    channel: String,
    rx: mpsc::Receiver<String>,
    forwarder: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wraps a receiver fed directly by the broker.
    pub fn new(channel: impl Into<String>, rx: mpsc::Receiver<String>) -> Self {
        Self {
            channel: channel.into(),
            rx,
            forwarder: None,
        }
    }

    /// Wraps a receiver fed by a background task; the task is aborted on drop.
    pub fn with_forwarder(
        channel: impl Into<String>,
        rx: mpsc::Receiver<String>,
        forwarder: JoinHandle<()>,
    ) -> Self {
        Self {
            channel: channel.into(),
            rx,
            forwarder: Some(forwarder),
        }
    }

    /// Channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next payload, or `None` once the subscription is lost.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}
