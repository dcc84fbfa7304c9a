//! # HealthChecker: broker reachability probe.
//!
//! Same loop shape as the heartbeat: probe immediately, then on every tick.
//! The first failed probe fires the [`ShutdownSignal`]; later failures are
//! logged and published only. The loop keeps going until the coordinator
//! propagates cancellation back through `token`.

use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::BrokerRef;
use crate::core::ShutdownSignal;
use crate::events::{Bus, Event, EventKind};

/// Probes the broker on a fixed interval and escalates the first failure.
pub struct HealthChecker {
    broker: BrokerRef,
    interval: Duration,
    signal: ShutdownSignal,
    bus: Bus,
}

impl HealthChecker {
    pub fn new(broker: BrokerRef, interval: Duration, signal: ShutdownSignal, bus: Bus) -> Self {
        Self {
            broker,
            interval,
            signal,
            bus,
        }
    }

    /// Runs until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        info!(interval = ?self.interval, "health checker started");
        self.check().await;

        let sleep = time::sleep(self.interval);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = &mut sleep => {
                    self.check().await;
                    sleep.as_mut().reset(Instant::now() + self.interval);
                }
            }
        }
        info!("health checker stopped");
    }

    async fn check(&self) {
        let err = match self.broker.ping().await {
            Ok(()) => {
                debug!("broker reachable");
                return;
            }
            Err(err) => err,
        };

        self.bus
            .publish(Event::new(EventKind::ProbeFailed).with_reason(err.to_string()));

        let reason = format!("broker health check failed: {err}");
        if self.signal.fire(reason.as_str()) {
            error!(error = %err, "broker unreachable, requesting shutdown");
            self.bus
                .publish(Event::new(EventKind::ShutdownRequested).with_reason(reason));
        } else {
            warn!(error = %err, "broker still unreachable, shutdown already requested");
        }
    }
}
