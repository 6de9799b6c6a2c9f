//! The result normalizer.

use qjs_bridge_runtime::{Engine, EngineValue, JsError};

use crate::error::{Error, Result};

/// Turn an engine return into exactly one of a value or an error.
///
/// A pending exception on the engine takes precedence over whatever value was
/// returned. An error-shaped value is converted next. On both error paths the
/// value is dropped here, before returning.
pub(crate) fn normalize<E: Engine>(engine: &mut E, value: E::Value) -> Result<E::Value> {
    if engine.has_exception() {
        drop(value);
        let exception = engine
            .take_exception()
            .unwrap_or_else(|| JsError::new("Error", "unknown pending exception"));
        return Err(Error::Exception(exception));
    }
    if value.is_error() {
        let exception = value.exception();
        drop(value);
        return Err(Error::Exception(exception));
    }
    Ok(value)
}
