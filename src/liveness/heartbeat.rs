//! # HeartbeatManager: one identity's liveness record.
//!
//! ## Lifecycle
//! ```text
//! run(token)
//!   ├─► renew()                       (immediately)
//!   │     first: insert_if_absent ──► false? ──► update_if_present
//!   │     later: update_if_present
//!   └─► loop select! (biased)
//!         ├─ token.cancelled() ──► remove_member ──► exit
//!         └─ sleep(interval)   ──► renew() ──► reset sleep
//! ```
//!
//! ## Rules
//! - Renewal and removal are strictly ordered: one loop owns the record
//! - Cancellation wins over a pending renewal (biased select)
//! - Broker errors are logged and published, never fatal; the health checker
//!   decides whether an unreachable broker ends the process
//! - Scores never go backwards, even if the wall clock does

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BrokerError;
use crate::events::{Bus, Event, EventKind};
use crate::liveness::AtomicScoreSet;

/// Periodically renews the liveness record of one identity.
pub struct HeartbeatManager {
    identity: String,
    key: String,
    interval: Duration,
    scores: AtomicScoreSet,
    bus: Bus,
    created: bool,
    last_score: i64,
}

impl HeartbeatManager {
    pub fn new(
        identity: impl Into<String>,
        key: impl Into<String>,
        interval: Duration,
        scores: AtomicScoreSet,
        bus: Bus,
    ) -> Self {
        Self {
            identity: identity.into(),
            key: key.into(),
            interval,
            scores,
            bus,
            created: false,
            last_score: 0,
        }
    }

    /// Identity this manager renews.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Runs until `token` is cancelled, then removes the record and returns.
    pub async fn run(mut self, token: CancellationToken) {
        info!(identity = %self.identity, key = %self.key, interval = ?self.interval, "heartbeat started");
        self.renew().await;

        let sleep = time::sleep(self.interval);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = &mut sleep => {
                    self.renew().await;
                    sleep.as_mut().reset(Instant::now() + self.interval);
                }
            }
        }

        self.remove().await;
    }

    async fn renew(&mut self) {
        let score = self.next_score();
        match self.try_renew(score).await {
            Ok(true) => {
                self.last_score = score;
                debug!(identity = %self.identity, score, "liveness renewed");
            }
            Ok(false) => {
                warn!(identity = %self.identity, "liveness record missing, not renewed");
                self.bus.publish(
                    Event::new(EventKind::HeartbeatMissing).with_subject(self.identity.as_str()),
                );
            }
            Err(err) => {
                warn!(identity = %self.identity, error = %err, "liveness renewal failed");
                self.bus.publish(
                    Event::new(EventKind::HeartbeatFailed)
                        .with_subject(self.identity.as_str())
                        .with_reason(err.to_string()),
                );
            }
        }
    }

    /// Returns whether the record now carries `score`.
    async fn try_renew(&mut self, score: i64) -> Result<bool, BrokerError> {
        if !self.created {
            let inserted = self
                .scores
                .insert_if_absent(&self.key, &self.identity, score)
                .await?;
            self.created = true;
            if inserted {
                self.bus.publish(
                    Event::new(EventKind::HeartbeatCreated)
                        .with_subject(self.identity.as_str())
                        .with_score(score),
                );
                return Ok(true);
            }
        }

        let updated = self
            .scores
            .update_if_present(&self.key, &self.identity, score)
            .await?;
        if updated {
            self.bus.publish(
                Event::new(EventKind::HeartbeatRenewed)
                    .with_subject(self.identity.as_str())
                    .with_score(score),
            );
        }
        Ok(updated)
    }

    async fn remove(&self) {
        match self.scores.remove_member(&self.key, &self.identity).await {
            Ok(removed) => {
                info!(identity = %self.identity, removed, "heartbeat stopped, liveness record removed");
                self.bus.publish(
                    Event::new(EventKind::HeartbeatRemoved).with_subject(self.identity.as_str()),
                );
            }
            Err(err) => {
                warn!(identity = %self.identity, error = %err, "failed to remove liveness record");
                self.bus.publish(
                    Event::new(EventKind::HeartbeatFailed)
                        .with_subject(self.identity.as_str())
                        .with_reason(err.to_string()),
                );
            }
        }
    }

    fn next_score(&self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        now.max(self.last_score)
    }
}
