use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// The reason a [`CancelSignal`] fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum CancelCause {
    /// The signal was cancelled explicitly.
    #[error("context canceled")]
    Canceled,
    /// A deadline attached to the signal, or an execution-time ceiling, passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Ambient cancellation state shared by a context and the engine it drives.
///
/// Cloning is cheap and every clone observes the same state. The first cause
/// recorded wins and the signal never resets: once fired, every evaluation on
/// the owning context is expected to fail with an interruption error.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cause: OnceLock<CancelCause>,
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// Create a signal that only fires when cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a signal that fires with [`CancelCause::DeadlineExceeded`] once
    /// `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Create a signal that fires with [`CancelCause::DeadlineExceeded`] at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(Inner {
                cause: OnceLock::new(),
                deadline: Some(deadline),
            }),
        }
    }

    /// Fire the signal with [`CancelCause::Canceled`].
    pub fn cancel(&self) {
        self.cancel_with(CancelCause::Canceled);
    }

    /// Fire the signal with `cause`, unless it already fired.
    pub fn cancel_with(&self, cause: CancelCause) {
        if self.inner.cause.set(cause).is_ok() {
            tracing::debug!(%cause, "cancel signal fired");
        }
    }

    /// The cause the signal fired with, if it fired.
    ///
    /// A passed deadline is latched here, so the cause stays stable afterwards.
    pub fn cause(&self) -> Option<CancelCause> {
        if let Some(cause) = self.inner.cause.get() {
            return Some(*cause);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel_with(CancelCause::DeadlineExceeded);
                self.inner.cause.get().copied()
            }
            _ => None,
        }
    }

    /// Whether the signal fired.
    pub fn is_cancelled(&self) -> bool {
        self.cause().is_some()
    }

    /// The deadline attached to the signal, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }
}
