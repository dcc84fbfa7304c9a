//! # Cancellation controls.
//!
//! A control requests cooperative termination of exactly one task. It must be
//! idempotent: invoking it again has no additional effect on the task.
//!
//! - [`CancellationToken`] is a control out of the box.
//! - [`CancelFn`] adapts any `Fn()` closure, so callers never have to declare
//!   a type just to satisfy the trait.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Requests cooperative termination of one task.
pub trait Cancel: Send + Sync + 'static {
    /// Requests cancellation. Calling it more than once is harmless.
    fn cancel(&self);
}

/// Shared handle to a cancellation control.
pub type CancelRef = Arc<dyn Cancel>;

impl Cancel for CancellationToken {
    fn cancel(&self) {
        CancellationToken::cancel(self);
    }
}

/// Closure-backed cancellation control.
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use pulsevisor::{Cancel, CancelFn, CancelRef};
///
/// let flag = Arc::new(AtomicBool::new(false));
/// let f = flag.clone();
/// let control: CancelRef = CancelFn::arc(move || f.store(true, Ordering::SeqCst));
///
/// control.cancel();
/// assert!(flag.load(Ordering::SeqCst));
/// ```
pub struct CancelFn<F> {
    f: F,
}

impl<F> CancelFn<F>
where
    F: Fn() + Send + Sync + 'static,
{
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps a closure and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

impl<F> Cancel for CancelFn<F>
where
    F: Fn() + Send + Sync + 'static,
{
    fn cancel(&self) {
        (self.f)()
    }
}

impl<F> fmt::Debug for CancelFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelFn").finish_non_exhaustive()
    }
}
