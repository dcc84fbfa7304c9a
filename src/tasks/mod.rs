//! Tasks: the [`Task`] contract, the [`TaskFn`] closure adapter and
//! [`TaskSpec`], which binds a task to the id it is cancelled by.

mod spec;
mod task;
mod task_fn;

pub use spec::TaskSpec;
pub use task::{Task, TaskRef};
pub use task_fn::TaskFn;
