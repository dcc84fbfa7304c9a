use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Unit of work run by the [`TaskRunner`](crate::TaskRunner).
///
/// `ctx` is cancelled when the task's deadline elapses, when a cancellation
/// request names its id, or when the process shuts down. The runner stops
/// polling the body at that point, so cleanup that must happen belongs before
/// the next `.await` that could be interrupted.
///
/// ```
/// use async_trait::async_trait;
/// use pulsevisor::{Task, TaskError};
/// use tokio_util::sync::CancellationToken;
///
/// struct Export {
///     rows: usize,
/// }
///
/// #[async_trait]
/// impl Task for Export {
///     fn name(&self) -> &str {
///         "export"
///     }
///
///     async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError> {
///         for _ in 0..self.rows {
///             if ctx.is_cancelled() {
///                 return Err(TaskError::Canceled);
///             }
///             tokio::task::yield_now().await;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Label used in logs. Cancellation targets the [`TaskId`](crate::TaskId) instead.
    fn name(&self) -> &str;

    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError>;
}

/// Shared handle to a task.
pub type TaskRef = Arc<dyn Task>;
