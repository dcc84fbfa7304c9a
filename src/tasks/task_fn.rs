//! Closure adapter for [`Task`].
//!
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use pulsevisor::{Task, TaskError, TaskFn, TaskRef};
//!
//! let poll: TaskRef = TaskFn::arc("poll-upstream", |ctx: CancellationToken| async move {
//!     tokio::select! {
//!         _ = ctx.cancelled() => Err(TaskError::Canceled),
//!         _ = tokio::time::sleep(Duration::from_secs(1)) => Ok(()),
//!     }
//! });
//! assert_eq!(poll.name(), "poll-upstream");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::tasks::Task;

/// [`Task`] built from `Fn(CancellationToken) -> Future`. Each run calls the
/// closure again, so state shared across runs goes in a captured `Arc`.
pub struct TaskFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> TaskFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Same as [`new`](Self::new), already behind an `Arc`.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F> std::fmt::Debug for TaskFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFn").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Task for TaskFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError> {
        (self.f)(ctx).await
    }
}
