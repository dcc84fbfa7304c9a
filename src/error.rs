//! Error types used by the pulsevisor runtime, the broker adapters and tasks.
//!
//! - [`RuntimeError`] errors raised by the coordinator itself.
//! - [`BrokerError`] failures talking to the shared broker (transient).
//! - [`RegistryError`] outcomes of the cancellation registry (caller logic / benign).
//! - [`TaskError`] errors raised by individual task executions and retry operations.
//! - [`SubmitError`] a bounded hand-off queue refused an item.
//!
//! Every enum provides `as_label` (stable snake_case) for logs and metrics.

use std::time::Duration;
use thiserror::Error;

use crate::cancel::TaskId;

/// # Errors produced by the coordinator runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some tasks were still registered.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// `cfg.grace` at the time of shutdown.
        grace: Duration,
        /// Identities of tasks that were still registered when the grace period ran out.
        stuck: Vec<String>,
    },

    /// Configuration could not be turned into a runnable coordinator.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The default broker could not be created.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// `run` was called a second time on the same coordinator.
    #[error("coordinator already started")]
    AlreadyStarted,
}

impl RuntimeError {
    /// Stable snake_case name of the variant.
    ///
    /// # Example
    /// ```
    /// use pulsevisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Config(_) => "runtime_config",
            RuntimeError::Broker(_) => "runtime_broker",
            RuntimeError::AlreadyStarted => "runtime_already_started",
        }
    }
}

/// # Errors produced while talking to the broker.
///
/// None of these are fatal on their own: callers log them and carry on,
/// only the health checker turns an unreachable broker into a shutdown.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker could not be reached or timed out.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// An established subscription stopped delivering messages.
    #[error("subscription to {channel} lost")]
    SubscriptionLost {
        /// Channel the subscription was listening on.
        channel: String,
    },

    /// A scripted operation returned something other than an integer reply.
    #[error("script {script} failed: {error}")]
    Script {
        /// Name of the script that failed.
        script: &'static str,
        /// Broker-side error message.
        error: String,
    },
}

impl BrokerError {
    /// Label for log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::Unavailable(_) => "broker_unavailable",
            BrokerError::SubscriptionLost { .. } => "broker_subscription_lost",
            BrokerError::Script { .. } => "broker_script",
        }
    }
}

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        BrokerError::Unavailable(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for BrokerError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        BrokerError::Unavailable("operation timed out".to_string())
    }
}

/// # Outcomes of the cancellation registry.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The identity already has a live cancellation control.
    #[error("task {0} is already registered")]
    AlreadyRegistered(TaskId),

    /// No live entry for the identity (already finished, or not registered yet).
    #[error("task {0} is not registered")]
    NotFound(TaskId),
}

impl RegistryError {
    /// Stable label, prefixed with `registry_`.
    ///
    /// # Example
    /// ```
    /// use pulsevisor::{RegistryError, TaskId};
    ///
    /// let err = RegistryError::NotFound(TaskId::from(7u64));
    /// assert_eq!(err.as_label(), "registry_not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::AlreadyRegistered(_) => "registry_already_registered",
            RegistryError::NotFound(_) => "registry_not_found",
        }
    }
}

/// # Errors produced by task execution and retry operations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task execution exceeded its deadline.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// Non-recoverable error (should not be retried).
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// Cause, rendered.
        error: String,
    },

    /// Execution failed but may succeed if retried.
    #[error("execution failed: {error}")]
    Fail {
        /// Cause, rendered.
        error: String,
    },

    /// Task was cancelled through its cancellation control or by shutdown.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for a retryable [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Stable label, prefixed with `task_`.
    ///
    /// # Example
    /// ```
    /// use pulsevisor::TaskError;
    /// use std::time::Duration;
    ///
    /// let err = TaskError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "task_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// `Fail` and `Timeout` may succeed on a later attempt.
    ///
    /// Returns `true` for [`TaskError::Fail`] and [`TaskError::Timeout`].
    ///
    /// # Example
    /// ```
    /// use pulsevisor::TaskError;
    ///
    /// assert!(TaskError::fail("boom").is_retryable());
    /// assert!(!TaskError::Fatal { error: "nope".into() }.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Fail { .. } | TaskError::Timeout { .. })
    }
}

impl From<BrokerError> for TaskError {
    fn from(err: BrokerError) -> Self {
        TaskError::Fail {
            error: err.to_string(),
        }
    }
}

/// # Refusals of the bounded hand-off queues (retry queue, task submission).
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The queue is at capacity.
    #[error("queue is full")]
    Full,

    /// The consuming side stopped.
    #[error("queue is closed")]
    Closed,
}

impl SubmitError {
    /// Stable label, prefixed with `submit_`.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubmitError::Full => "submit_full",
            SubmitError::Closed => "submit_closed",
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::TrySendError<T>> for SubmitError {
    fn from(err: tokio::sync::mpsc::error::TrySendError<T>) -> Self {
        match err {
            tokio::sync::mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            tokio::sync::mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for SubmitError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        SubmitError::Closed
    }
}
