use qjs_bridge_runtime::{Abort, CancelCause, JsError};

/// Errors returned by the bridge operations.
///
/// Every failure of an engine call surfaces as one of these; nothing escapes
/// the call boundary as a panic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source identifier was empty. No engine call was made.
    #[error("invalid file name: the source identifier must not be empty")]
    InvalidFileName,

    /// The script threw, or evaluated to an `Error` value.
    #[error("{0}")]
    Exception(#[from] JsError),

    /// Evaluation was torn down after the context's cancel signal fired.
    /// The call did not complete; it is safe to stop waiting for it.
    #[error("evaluation interrupted: {0}")]
    Interrupted(#[source] CancelCause),

    /// The engine aborted with no cancellation in effect. The context should
    /// be considered unusable.
    #[error("engine aborted: {0}")]
    Aborted(String),

    /// An execution monitor could not be started, so nothing was run.
    #[error("execution monitor failed to start: {0}")]
    Monitor(String),

    /// Engine construction or another host-side failure.
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

impl Error {
    /// The cancellation cause, if this is an interruption.
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        match self {
            Self::Interrupted(cause) => Some(*cause),
            _ => None,
        }
    }

    /// The script exception, if this is one.
    pub fn exception(&self) -> Option<&JsError> {
        match self {
            Self::Exception(exception) => Some(exception),
            _ => None,
        }
    }

    /// Whether the error left the context unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Interrupted(_) | Self::Aborted(_))
    }
}

impl From<Abort> for Error {
    fn from(abort: Abort) -> Self {
        Self::Aborted(abort.into_detail())
    }
}

/// The result of a bridge operation.
pub type Result<T> = std::result::Result<T, Error>;
