//! # Task identity.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Caller-assigned identity of a task, unique while the task is active.
///
/// Integers and strings are both accepted; the textual form is what travels
/// over the cancellation channel.
///
/// ```rust
/// use pulsevisor::TaskId;
///
/// let a = TaskId::from(7u64);
/// let b: TaskId = " 7\n".parse().unwrap();
/// assert_eq!(a, b);
/// assert!("".parse::<TaskId>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Arc<str>);

impl TaskId {
    /// Returns the textual form of the identity.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A payload that does not name a task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("empty task id")]
pub struct ParseTaskIdError;

impl FromStr for TaskId {
    type Err = ParseTaskIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseTaskIdError);
        }
        Ok(TaskId(Arc::from(trimmed)))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for TaskId {
    fn from(n: u64) -> Self {
        TaskId(Arc::from(n.to_string()))
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(Arc::from(s))
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId(Arc::from(s))
    }
}

impl From<&TaskId> for Arc<str> {
    fn from(id: &TaskId) -> Self {
        Arc::clone(&id.0)
    }
}
