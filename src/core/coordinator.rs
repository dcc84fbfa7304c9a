//! # Coordinator: one lifetime for every component of a process.
//!
//! ```text
//! run(initial)
//!   ├─► observer_listener (Bus ──► ObserverSet)
//!   ├─► JoinSet (join barrier), each with a child of the runtime token:
//!   │     HeartbeatManager      renew liveness record, remove on exit
//!   │     HealthChecker         ping broker, fire ShutdownSignal on failure
//!   │     CancellationSubscriber broker channel ──► registry ──► cancel
//!   │     TaskRunner            initial specs + submit() stream
//!   │     RetryScheduler        fixed-cadence sweep of the retry buffer
//!   └─► drive_shutdown:
//!         select!
//!           ├─ OS signal          ─► fire ShutdownSignal
//!           ├─ ShutdownSignal     (health failure or shutdown())
//!           └─ all components exited on their own ─► Ok
//!         runtime_token.cancel()
//!         wait_all_with_grace(cfg.grace)
//!           ├─ all stopped  ─► AllStoppedWithin, Ok
//!           └─ timeout      ─► GraceExceeded { stuck: registered ids }
//! ```
//!
//! The runtime token is cancelled exactly once, by `drive_shutdown`. Components
//! never cancel it themselves; the health checker only fires the signal.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::BrokerRef;
use crate::cancel::{self, CancellationRegistry, CancellationSubscriber, TaskId};
use crate::config::Config;
use crate::core::builder::CoordinatorBuilder;
use crate::core::runner::TaskRunner;
use crate::core::shutdown::{self, ShutdownSignal};
use crate::error::{BrokerError, RuntimeError, SubmitError};
use crate::events::{Bus, Event, EventKind};
use crate::liveness::{AtomicScoreSet, HealthChecker, HeartbeatManager};
use crate::observers::{Observe, ObserverSet};
use crate::retry::{RetryQueue, RetryScheduler};
use crate::tasks::TaskSpec;

/// Parts consumed by the first call to [`Coordinator::run`].
pub(crate) struct Startup {
    pub(crate) observers: Vec<Arc<dyn Observe>>,
    pub(crate) specs: mpsc::Receiver<TaskSpec>,
    pub(crate) retry: RetryScheduler,
}

/// Owns the components of one process and their shared state.
pub struct Coordinator {
    cfg: Config,
    identity: String,
    broker: BrokerRef,
    registry: Arc<CancellationRegistry>,
    bus: Bus,
    signal: ShutdownSignal,
    runtime_token: CancellationToken,
    specs: mpsc::Sender<TaskSpec>,
    retry_queue: RetryQueue,
    startup: Mutex<Option<Startup>>,
}

impl Coordinator {
    /// Starts building a coordinator from `cfg`.
    pub fn builder(cfg: Config) -> CoordinatorBuilder {
        CoordinatorBuilder::new(cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: Config,
        identity: String,
        broker: BrokerRef,
        bus: Bus,
        specs: mpsc::Sender<TaskSpec>,
        retry_queue: RetryQueue,
        startup: Startup,
    ) -> Self {
        Self {
            cfg,
            identity,
            broker,
            registry: Arc::new(CancellationRegistry::new()),
            bus,
            signal: ShutdownSignal::new(),
            runtime_token: CancellationToken::new(),
            specs,
            retry_queue,
            startup: Mutex::new(Some(startup)),
        }
    }

    /// Runs every component until shutdown.
    ///
    /// Returns once all components stopped, or with
    /// [`RuntimeError::GraceExceeded`] if they did not stop within `cfg.grace`.
    pub async fn run(&self, initial: Vec<TaskSpec>) -> Result<(), RuntimeError> {
        let startup = self
            .startup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RuntimeError::AlreadyStarted)?;

        info!(identity = %self.identity, initial = initial.len(), "coordinator starting");
        let listener_stop = CancellationToken::new();
        let listener = self.observer_listener(startup.observers, listener_stop.clone());

        let mut set = JoinSet::new();
        self.spawn_components(&mut set, initial, startup.specs, startup.retry);
        let res = self.drive_shutdown(&mut set).await;

        listener_stop.cancel();
        if let Err(err) = listener.await {
            error!(error = %err, "observer listener join failed");
        }
        info!(identity = %self.identity, ok = res.is_ok(), "coordinator stopped");
        res
    }

    /// Queues a task for the runner.
    pub async fn submit(&self, spec: TaskSpec) -> Result<(), SubmitError> {
        self.specs.send(spec).await?;
        Ok(())
    }

    /// Queues a task for the runner without waiting for room.
    pub fn try_submit(&self, spec: TaskSpec) -> Result<(), SubmitError> {
        self.specs.try_send(spec)?;
        Ok(())
    }

    /// Publishes a cancellation request for `id` on the configured channel.
    ///
    /// Reaches every process subscribed to the channel, this one included.
    pub async fn request_cancel(&self, id: &TaskId) -> Result<u64, BrokerError> {
        cancel::request_cancel(self.broker.as_ref(), &self.cfg.cancel_channel, id).await
    }

    /// Producer side of the retry buffer.
    pub fn retry_queue(&self) -> &RetryQueue {
        &self.retry_queue
    }

    /// Cancellation controls of the tasks running in this process.
    pub fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    /// Requests a graceful shutdown.
    pub fn shutdown(&self) {
        self.request_shutdown("shutdown requested");
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.signal
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Identity of this process in the liveness set.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    fn request_shutdown(&self, reason: &str) {
        if self.signal.fire(reason) {
            info!(reason, "shutdown requested");
            self.bus
                .publish(Event::new(EventKind::ShutdownRequested).with_reason(reason));
        }
    }

    /// Forwards bus events to the observer set until `stop`, then drains and
    /// shuts the set down.
    fn observer_listener(
        &self,
        observers: Vec<Arc<dyn Observe>>,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let set = ObserverSet::new(observers, self.bus.clone());
        let mut rx = self.bus.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "observer listener lagged behind the bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        while let Ok(ev) = rx.try_recv() {
                            set.emit(&ev);
                        }
                        break;
                    }
                }
            }
            set.shutdown().await;
        })
    }

    fn spawn_components(
        &self,
        set: &mut JoinSet<()>,
        initial: Vec<TaskSpec>,
        specs: mpsc::Receiver<TaskSpec>,
        retry: RetryScheduler,
    ) {
        let token = &self.runtime_token;

        let heartbeat = HeartbeatManager::new(
            self.identity.clone(),
            self.cfg.liveness_key.clone(),
            self.cfg.heartbeat_interval.0,
            AtomicScoreSet::new(Arc::clone(&self.broker)),
            self.bus.clone(),
        );
        set.spawn(heartbeat.run(token.child_token()));

        let health = HealthChecker::new(
            Arc::clone(&self.broker),
            self.cfg.health_interval.0,
            self.signal.clone(),
            self.bus.clone(),
        );
        set.spawn(health.run(token.child_token()));

        let subscriber = CancellationSubscriber::new(
            Arc::clone(&self.broker),
            self.cfg.cancel_channel.clone(),
            Arc::clone(&self.registry),
            self.bus.clone(),
        );
        set.spawn(subscriber.run(token.child_token()));

        let runner = TaskRunner::new(
            Arc::clone(&self.registry),
            self.bus.clone(),
            self.cfg.default_task_timeout(),
        );
        let runner_token = token.child_token();
        set.spawn(async move {
            let summary = runner.run_stream(initial, specs, &runner_token).await;
            info!(?summary, "task runner stopped");
        });

        set.spawn(retry.with_bus(self.bus.clone()).run(token.child_token()));
        debug!("coordinator components spawned");
    }

    /// Waits for a shutdown trigger, then cancels the runtime token and waits
    /// for the components within the grace period.
    async fn drive_shutdown(&self, set: &mut JoinSet<()>) -> Result<(), RuntimeError> {
        let os_signal = async {
            match shutdown::wait_for_shutdown_signal().await {
                Ok(()) => {}
                Err(err) => {
                    warn!(error = %err, "os signal handlers unavailable");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = os_signal => self.request_shutdown("termination signal received"),
            _ = self.signal.fired() => {
                debug!(reason = self.signal.reason().unwrap_or_default(), "shutdown signal fired");
            }
            _ = join_all(set) => {
                info!("all components exited");
                return Ok(());
            }
        }

        self.runtime_token.cancel();
        self.wait_all_with_grace(set).await
    }

    async fn wait_all_with_grace(&self, set: &mut JoinSet<()>) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace.0;
        match tokio::time::timeout(grace, join_all(set)).await {
            Ok(()) => {
                info!(?grace, "all components stopped within grace");
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                let stuck: Vec<String> = self
                    .registry
                    .ids()
                    .iter()
                    .map(|id| id.as_str().to_string())
                    .collect();
                error!(?grace, ?stuck, "grace period exceeded");
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")),
                );

                self.registry.cancel_all();
                set.abort_all();
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}

async fn join_all(set: &mut JoinSet<()>) {
    while let Some(res) = set.join_next().await {
        if let Err(err) = res {
            if err.is_panic() {
                error!(error = %err, "component panicked");
            }
        }
    }
}
