//! # TaskRunner: deadline-bounded tasks with registered cancellation controls.
//!
//! ## Lifecycle of one task
//! ```text
//! start(spec, parent)
//!   ├─► ctx = parent.child_token()
//!   ├─► registry.register(id, ctx)        AlreadyRegistered ─► TaskRejected, not started
//!   ├─► publish TaskRegistered
//!   └─► spawned:
//!         select! (biased)
//!           ├─ task.run(ctx)     ─► Completed / Failed / Canceled
//!           ├─ ctx.cancelled()   ─► Canceled   (control invoked or shutdown)
//!           └─ deadline elapsed  ─► TimedOut
//!         ctx.cancel()                        context concluded
//!         registry.remove(id)
//!         publish TaskConcluded
//! ```
//!
//! ## Rules
//! - Registration happens before the body is spawned, so a cancellation
//!   request can be served as soon as `start` returns
//! - Requests that arrive before registration resolve as `NotFound`
//!   (best effort, not guaranteed delivery)
//! - Removal happens on every exit path, exactly once per registration

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cancel::{CancellationRegistry, TaskId};
use crate::error::{RegistryError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{Task, TaskSpec};

/// How a task's context concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The body returned `Ok(())`.
    Completed,
    /// The body returned an error other than `Canceled`.
    Failed(TaskError),
    /// The cancellation control was invoked or the process shut down.
    Canceled,
    /// The deadline elapsed first.
    TimedOut(Duration),
}

impl TaskOutcome {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Failed(_) => "failed",
            TaskOutcome::Canceled => "canceled",
            TaskOutcome::TimedOut(_) => "timed_out",
        }
    }
}

/// Counters of a batch or stream of tasks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub canceled: usize,
    pub timed_out: usize,
    /// Specs refused because their id was already registered.
    pub rejected: usize,
}

impl RunSummary {
    fn record(&mut self, joined: Result<(TaskId, TaskOutcome), JoinError>) {
        match joined {
            Ok((_, TaskOutcome::Completed)) => self.completed += 1,
            Ok((_, TaskOutcome::Failed(_))) => self.failed += 1,
            Ok((_, TaskOutcome::Canceled)) => self.canceled += 1,
            Ok((_, TaskOutcome::TimedOut(_))) => self.timed_out += 1,
            Err(err) => {
                error!(error = %err, "task runner join failed");
                self.failed += 1;
            }
        }
    }

    /// Number of tasks that were started.
    pub fn started(&self) -> usize {
        self.completed + self.failed + self.canceled + self.timed_out
    }
}

/// Runs tasks under deadline-bounded contexts registered in a shared registry.
#[derive(Clone)]
pub struct TaskRunner {
    registry: Arc<CancellationRegistry>,
    bus: Bus,
    default_timeout: Option<Duration>,
}

impl TaskRunner {
    pub fn new(
        registry: Arc<CancellationRegistry>,
        bus: Bus,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            bus,
            default_timeout,
        }
    }

    /// Registry the runner writes to.
    pub fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    /// Registers and spawns one task.
    pub fn spawn(
        &self,
        spec: TaskSpec,
        parent: &CancellationToken,
    ) -> Result<JoinHandle<TaskOutcome>, RegistryError> {
        let fut = self.start(spec, parent)?;
        Ok(tokio::spawn(async move { fut.await.1 }))
    }

    /// Invokes the cancellation control of a local task.
    pub fn cancel(&self, id: &TaskId) -> Result<(), RegistryError> {
        self.registry.lookup(id)?.cancel();
        Ok(())
    }

    /// Runs a bounded set of tasks concurrently and waits for all of them.
    pub async fn run_all(
        &self,
        specs: impl IntoIterator<Item = TaskSpec>,
        parent: &CancellationToken,
    ) -> RunSummary {
        self.drive(specs, None, parent).await
    }

    /// Runs `initial`, then every spec received on `rx`, until the stream
    /// closes and all tasks concluded, or `parent` is cancelled and all tasks
    /// wound down.
    pub async fn run_stream(
        &self,
        initial: impl IntoIterator<Item = TaskSpec>,
        rx: mpsc::Receiver<TaskSpec>,
        parent: &CancellationToken,
    ) -> RunSummary {
        self.drive(initial, Some(rx), parent).await
    }

    async fn drive(
        &self,
        initial: impl IntoIterator<Item = TaskSpec>,
        mut rx: Option<mpsc::Receiver<TaskSpec>>,
        parent: &CancellationToken,
    ) -> RunSummary {
        let mut set = JoinSet::new();
        let mut summary = RunSummary::default();

        for spec in initial {
            self.start_into(&mut set, spec, parent, &mut summary);
        }

        loop {
            if rx.is_none() && set.is_empty() {
                break;
            }
            tokio::select! {
                biased;
                _ = parent.cancelled() => break,
                spec = recv(&mut rx) => match spec {
                    Some(spec) => self.start_into(&mut set, spec, parent, &mut summary),
                    None => rx = None,
                },
                Some(joined) = set.join_next() => summary.record(joined),
            }
        }

        // Tasks observe the cancelled parent through their child tokens.
        while let Some(joined) = set.join_next().await {
            summary.record(joined);
        }
        debug!(?summary, "task runner drained");
        summary
    }

    fn start_into(
        &self,
        set: &mut JoinSet<(TaskId, TaskOutcome)>,
        spec: TaskSpec,
        parent: &CancellationToken,
        summary: &mut RunSummary,
    ) {
        match self.start(spec, parent) {
            Ok(fut) => {
                set.spawn(fut);
            }
            Err(_) => summary.rejected += 1,
        }
    }

    /// Registers the task and returns the future driving it to conclusion.
    fn start(
        &self,
        spec: TaskSpec,
        parent: &CancellationToken,
    ) -> Result<impl Future<Output = (TaskId, TaskOutcome)> + Send + 'static, RegistryError> {
        let id = spec.id().clone();
        let ctx = parent.child_token();

        if let Err(err) = self.registry.register(id.clone(), Arc::new(ctx.clone())) {
            warn!(task = %id, name = spec.name(), "task id already registered, not starting");
            self.bus.publish(
                Event::new(EventKind::TaskRejected)
                    .with_subject(&id)
                    .with_reason(err.as_label()),
            );
            return Err(err);
        }

        let deadline = spec
            .timeout()
            .or(self.default_timeout)
            .filter(|d| *d > Duration::ZERO);
        let mut registered = Event::new(EventKind::TaskRegistered).with_subject(&id);
        if let Some(d) = deadline {
            registered = registered.with_timeout(d);
        }
        self.bus.publish(registered);
        debug!(task = %id, name = spec.name(), ?deadline, "task started");

        let registry = Arc::clone(&self.registry);
        let bus = self.bus.clone();
        Ok(async move {
            let outcome = run_once(spec.task().as_ref(), &ctx, deadline).await;

            ctx.cancel();
            registry.remove(&id);

            match &outcome {
                TaskOutcome::Failed(err) => {
                    warn!(task = %id, error = %err, "task failed")
                }
                other => info!(task = %id, outcome = other.as_label(), "task concluded"),
            }
            bus.publish(
                Event::new(EventKind::TaskConcluded)
                    .with_subject(&id)
                    .with_reason(outcome.as_label()),
            );
            (id, outcome)
        })
    }
}

/// Executes one task body inside its context.
async fn run_once(
    task: &dyn Task,
    ctx: &CancellationToken,
    deadline: Option<Duration>,
) -> TaskOutcome {
    let deadline_elapsed = async {
        match deadline {
            Some(d) => time::sleep(d).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        res = task.run(ctx.clone()) => match res {
            Ok(()) => TaskOutcome::Completed,
            Err(TaskError::Canceled) => TaskOutcome::Canceled,
            Err(err) => TaskOutcome::Failed(err),
        },
        _ = ctx.cancelled() => TaskOutcome::Canceled,
        _ = deadline_elapsed => TaskOutcome::TimedOut(deadline.unwrap_or_default()),
    }
}

/// Receives from the stream while it is open; pends forever once it closed.
async fn recv(rx: &mut Option<mpsc::Receiver<TaskSpec>>) -> Option<TaskSpec> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{TaskFn, TaskRef};

    fn runner() -> TaskRunner {
        TaskRunner::new(Arc::new(CancellationRegistry::new()), Bus::new(64), None)
    }

    fn waits_for_cancel() -> TaskRef {
        TaskFn::arc("waiter", |ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Err::<(), _>(TaskError::Canceled)
        })
    }

    fn instant(result: Result<(), TaskError>) -> TaskRef {
        TaskFn::arc("instant", move |_ctx: CancellationToken| {
            let result = result.clone();
            async move { result }
        })
    }

    #[tokio::test]
    async fn test_completed_task_is_deregistered() {
        let runner = runner();
        let parent = CancellationToken::new();

        let handle = runner
            .spawn(TaskSpec::new(1u64, instant(Ok(()))), &parent)
            .unwrap();
        assert_eq!(handle.await.unwrap(), TaskOutcome::Completed);
        assert!(runner.registry().is_empty());
    }

    #[tokio::test]
    async fn test_registered_before_spawn_returns() {
        let runner = runner();
        let parent = CancellationToken::new();

        let handle = runner
            .spawn(TaskSpec::new(5u64, waits_for_cancel()), &parent)
            .unwrap();
        assert!(runner.registry().contains(&TaskId::from(5u64)));

        runner.cancel(&TaskId::from(5u64)).unwrap();
        assert_eq!(handle.await.unwrap(), TaskOutcome::Canceled);
        assert!(runner.registry().is_empty());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let runner = runner();
        let parent = CancellationToken::new();

        let first = runner
            .spawn(TaskSpec::new(1u64, waits_for_cancel()), &parent)
            .unwrap();
        let second = runner.spawn(TaskSpec::new(1u64, instant(Ok(()))), &parent);
        assert!(matches!(second, Err(RegistryError::AlreadyRegistered(_))));

        parent.cancel();
        assert_eq!(first.await.unwrap(), TaskOutcome::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_concludes_context() {
        let runner = runner();
        let parent = CancellationToken::new();
        let spec = TaskSpec::new("slow", waits_for_cancel())
            .with_timeout(Some(Duration::from_millis(200)));

        let handle = runner.spawn(spec, &parent).unwrap();
        assert_eq!(
            handle.await.unwrap(),
            TaskOutcome::TimedOut(Duration::from_millis(200))
        );
        assert!(runner.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timeout_applies_when_spec_has_none() {
        let runner = TaskRunner::new(
            Arc::new(CancellationRegistry::new()),
            Bus::new(8),
            Some(Duration::from_secs(1)),
        );
        let parent = CancellationToken::new();
        let handle = runner
            .spawn(TaskSpec::new(1u64, waits_for_cancel()), &parent)
            .unwrap();
        assert_eq!(
            handle.await.unwrap(),
            TaskOutcome::TimedOut(Duration::from_secs(1))
        );
    }

    #[tokio::test]
    async fn test_run_all_counts_outcomes() {
        let runner = runner();
        let parent = CancellationToken::new();
        let specs = vec![
            TaskSpec::new(1u64, instant(Ok(()))),
            TaskSpec::new(2u64, instant(Err(TaskError::fail("boom")))),
            TaskSpec::new(3u64, instant(Err(TaskError::Canceled))),
            TaskSpec::new(4u64, instant(Ok(()))),
        ];

        let summary = runner.run_all(specs, &parent).await;
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.canceled, 1);
        assert_eq!(summary.started(), 4);
        assert!(runner.registry().is_empty());
    }

    #[tokio::test]
    async fn test_run_stream_until_closed() {
        let runner = runner();
        let parent = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);

        let driver = {
            let runner = runner.clone();
            let parent = parent.clone();
            tokio::spawn(async move {
                runner
                    .run_stream(vec![TaskSpec::new(0u64, instant(Ok(())))], rx, &parent)
                    .await
            })
        };
        for i in 1..=3u64 {
            tx.send(TaskSpec::new(i, instant(Ok(())))).await.unwrap();
        }
        drop(tx);

        let summary = driver.await.unwrap();
        assert_eq!(summary.completed, 4);
        assert_eq!(summary.rejected, 0);
    }

    #[tokio::test]
    async fn test_run_stream_winds_down_on_shutdown() {
        let runner = runner();
        let parent = CancellationToken::new();
        let (_tx, rx) = mpsc::channel(4);

        let driver = {
            let runner = runner.clone();
            let parent = parent.clone();
            tokio::spawn(async move {
                let specs = (0..5u64).map(|i| TaskSpec::new(i, waits_for_cancel()));
                runner.run_stream(specs, rx, &parent).await
            })
        };
        tokio::task::yield_now().await;
        parent.cancel();

        let summary = driver.await.unwrap();
        assert_eq!(summary.canceled, 5);
        assert!(runner.registry().is_empty());
    }
}
