//! The cancellation guard around evaluation.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use qjs_bridge_runtime::CancelSignal;
use tracing::{Level, instrument};

use crate::error::{Error, Result};
use crate::sandbox::metrics::record_interruption;

/// Run `call`, converting any abrupt failure into an error.
///
/// Abrupt failures are panics unwinding out of `call` and
/// [`Error::Aborted`] results. They become [`Error::Interrupted`] when
/// `signal` has fired, and [`Error::Aborted`] otherwise. Every other result
/// passes through untouched.
#[instrument(skip_all, level = Level::DEBUG)]
pub(crate) fn guard<T>(signal: &CancelSignal, call: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Err(Error::Aborted(detail))) => Err(classify(signal, detail)),
        Ok(result) => result,
        Err(payload) => Err(classify(signal, panic_detail(payload.as_ref()))),
    }
}

fn classify(signal: &CancelSignal, detail: String) -> Error {
    match signal.cause() {
        Some(cause) => {
            tracing::warn!(%cause, %detail, "evaluation interrupted");
            record_interruption(Some(cause));
            Error::Interrupted(cause)
        }
        None => {
            tracing::warn!(%detail, "engine aborted");
            record_interruption(None);
            Error::Aborted(detail)
        }
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "engine call panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use qjs_bridge_runtime::{CancelCause, JsError};

    use super::*;

    #[test]
    fn normal_results_pass_through() {
        let signal = CancelSignal::new();
        assert_eq!(guard(&signal, || Ok(7)).unwrap(), 7);

        let err = guard::<()>(&signal, || Err(JsError::new("Error", "x").into())).unwrap_err();
        assert!(matches!(err, Error::Exception(_)));
    }

    #[test]
    fn panic_without_cancellation_is_an_abort() {
        let signal = CancelSignal::new();
        let err = guard::<()>(&signal, || panic!("engine exploded")).unwrap_err();
        assert!(matches!(err, Error::Aborted(detail) if detail == "engine exploded"));
    }

    #[test]
    fn panic_after_cancellation_is_an_interruption() {
        let signal = CancelSignal::new();
        let err = guard::<()>(&signal, || {
            signal.cancel();
            panic!("torn down")
        })
        .unwrap_err();
        assert_eq!(err.cancel_cause(), Some(CancelCause::Canceled));
    }

    #[test]
    fn formatted_panic_messages_are_kept() {
        let signal = CancelSignal::new();
        let err = guard::<()>(&signal, || panic!("code {}", 42)).unwrap_err();
        assert!(matches!(err, Error::Aborted(detail) if detail == "code 42"));
    }

    #[test]
    fn abort_results_are_classified_by_the_signal() {
        let signal = CancelSignal::new();
        signal.cancel_with(CancelCause::DeadlineExceeded);
        let err = guard::<()>(&signal, || Err(Error::Aborted("gone".into()))).unwrap_err();
        assert_eq!(err.cancel_cause(), Some(CancelCause::DeadlineExceeded));
    }
}
