//! # Shutdown primitives.
//!
//! - [`ShutdownSignal`] single-fire broadcast shared by every component
//! - [`wait_for_shutdown_signal`] completes when the process receives a termination signal
//!
//! ## Signals
//! **Unix platforms:** `SIGINT`, `SIGTERM`, `SIGQUIT`
//!
//! **Windows platforms:** `Ctrl-C` via [`tokio::signal::ctrl_c`]

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

struct Inner {
    /// Set once; doubles as the fired flag.
    reason: OnceLock<String>,
    token: CancellationToken,
}

/// Single-fire shutdown broadcast.
///
/// [`fire`](Self::fire) returns `true` for exactly one caller even under
/// concurrent triggering; that caller's reason is kept and the shared token
/// is cancelled. Every clone observes the same signal.
///
/// ```rust
/// use pulsevisor::ShutdownSignal;
///
/// let signal = ShutdownSignal::new();
/// assert!(signal.fire("broker unreachable"));
/// assert!(!signal.fire("again"));
/// assert_eq!(signal.reason(), Some("broker unreachable"));
/// assert!(signal.token().is_cancelled());
/// ```
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    /// Creates an unfired signal with its own token.
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Creates an unfired signal that cancels `token` when fired.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                reason: OnceLock::new(),
                token,
            }),
        }
    }

    /// Fires the signal. Returns `true` only for the first caller.
    pub fn fire(&self, reason: impl Into<String>) -> bool {
        if self.inner.reason.set(reason.into()).is_err() {
            return false;
        }
        self.inner.token.cancel();
        true
    }

    /// True once the signal fired. The reason is readable from then on.
    pub fn is_fired(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    /// Reason given by the caller that fired the signal.
    pub fn reason(&self) -> Option<&str> {
        self.inner.reason.get().map(String::as_str)
    }

    /// Token cancelled when the signal fires.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Completes once the signal fired.
    pub async fn fired(&self) {
        self.inner.token.cancelled().await
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for a termination signal.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal registration fails.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
