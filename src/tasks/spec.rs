//! [`TaskSpec`]: a task, the id it is cancelled by, and its deadline.
//!
//! A spec without a deadline inherits the runner's default
//! (see [`Config::default_task_timeout`]).

use std::time::Duration;

use crate::cancel::TaskId;
use crate::config::Config;
use crate::tasks::TaskRef;

/// What the [`TaskRunner`](crate::TaskRunner) needs to start one task.
///
/// ```rust
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use pulsevisor::{TaskError, TaskFn, TaskRef, TaskSpec};
///
/// let compact: TaskRef = TaskFn::arc("compact", |ctx: CancellationToken| async move {
///     ctx.cancelled().await;
///     Err::<(), _>(TaskError::Canceled)
/// });
///
/// let spec = TaskSpec::new(7u64, compact).with_timeout(Some(Duration::from_secs(10)));
/// assert_eq!(spec.id().as_str(), "7");
/// assert_eq!(spec.name(), "compact");
/// assert_eq!(spec.timeout(), Some(Duration::from_secs(10)));
/// ```
#[derive(Clone)]
pub struct TaskSpec {
    id: TaskId,
    body: TaskRef,
    deadline: Option<Duration>,
}

impl TaskSpec {
    /// No deadline of its own; the runner default applies.
    pub fn new(id: impl Into<TaskId>, body: TaskRef) -> Self {
        Self {
            id: id.into(),
            body,
            deadline: None,
        }
    }

    /// Deadline taken from `cfg.task_timeout`.
    pub fn with_defaults(id: impl Into<TaskId>, body: TaskRef, cfg: &Config) -> Self {
        Self::new(id, body).with_timeout(cfg.default_task_timeout())
    }

    /// Key in the [`CancellationRegistry`](crate::CancellationRegistry).
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn task(&self) -> &TaskRef {
        &self.body
    }

    /// Log label of the body.
    pub fn name(&self) -> &str {
        self.body.name()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.deadline
    }

    /// Replaces the deadline; `None` falls back to the runner default.
    pub fn with_timeout(self, deadline: Option<Duration>) -> Self {
        Self { deadline, ..self }
    }
}
