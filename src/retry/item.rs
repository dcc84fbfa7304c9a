use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::TaskError;

/// Idempotent side-effecting operation that may fail transiently.
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    async fn run(&self) -> Result<(), TaskError>;
}

/// Shared handle to an operation.
pub type OperationRef = Arc<dyn Operation>;

/// Adapts a closure returning a future into an [`Operation`].
pub struct OperationFn<F> {
    f: F,
}

impl<F> OperationFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }

    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self { f })
    }
}

#[async_trait]
impl<F, Fut> Operation for OperationFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn run(&self) -> Result<(), TaskError> {
        (self.f)().await
    }
}

/// Buffered operation plus its retry bookkeeping.
///
/// ```rust
/// use std::time::Duration;
/// use pulsevisor::{OperationFn, RetryItem, TaskError};
///
/// let item = RetryItem::new(OperationFn::arc(|| async { Ok::<(), TaskError>(()) }))
///     .with_tag("flush-metrics")
///     .with_max_attempts(5);
/// assert_eq!(item.tag(), Some("flush-metrics"));
/// assert_eq!(item.attempts(), 0);
/// ```
pub struct RetryItem {
    pub(crate) operation: OperationRef,
    pub(crate) not_before: Option<Instant>,
    pub(crate) tag: Option<String>,
    pub(crate) max_attempts: Option<u32>,
    pub(crate) attempts: u32,
}

impl RetryItem {
    pub fn new(operation: OperationRef) -> Self {
        Self {
            operation,
            not_before: None,
            tag: None,
            max_attempts: None,
            attempts: 0,
        }
    }

    /// Label used in logs and events.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Skips sweeps before `at`.
    pub fn not_before(mut self, at: Instant) -> Self {
        self.not_before = Some(at);
        self
    }

    /// Skips sweeps for `delay` from now.
    pub fn after(self, delay: Duration) -> Self {
        self.not_before(Instant::now() + delay)
    }

    /// Drops the item after `n` failed attempts. Unlimited by default.
    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn is_due(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }

    pub(crate) fn exhausted(&self) -> bool {
        self.max_attempts.is_some_and(|max| self.attempts >= max)
    }

    pub(crate) fn label(&self) -> &str {
        self.tag.as_deref().unwrap_or("untagged")
    }
}

impl fmt::Debug for RetryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryItem")
            .field("tag", &self.tag)
            .field("not_before", &self.not_before)
            .field("max_attempts", &self.max_attempts)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}
