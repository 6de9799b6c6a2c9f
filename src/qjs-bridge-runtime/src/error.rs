use rquickjs::{Coerced, Ctx, Exception, Value};
use serde::{Deserialize, Serialize};

/// A JavaScript exception, detached from the engine that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{name}: {message}")]
pub struct JsError {
    /// The error's `name` property (`TypeError`, `SyntaxError`, ...).
    pub name: String,
    /// The error's `message` property.
    pub message: String,
    /// The error's `stack` property, when the engine recorded one.
    pub stack: Option<String>,
}

impl JsError {
    /// Create an error with no stack.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// An error raised by the host rather than by script code.
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new("InternalError", message)
    }

    pub(crate) fn from_exception(exception: &Exception<'_>) -> Self {
        let name = exception
            .get::<_, Option<String>>("name")
            .ok()
            .flatten()
            .unwrap_or_else(|| "Error".to_string());
        Self {
            name,
            message: exception.message().unwrap_or_default(),
            stack: exception.stack(),
        }
    }

    /// Convert a thrown value that is not an `Error` instance (`throw "oops"`).
    pub(crate) fn from_thrown<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Self {
        if let Some(exception) = value.as_exception() {
            return Self::from_exception(exception);
        }
        let message = match value.get::<Coerced<String>>() {
            Ok(Coerced(message)) => message,
            Err(_) => format!("uncaught {:?}", value.type_of()),
        };
        // coercion may itself throw (e.g. a thrown Symbol), drop that secondary exception
        let _ = ctx.catch();
        Self::new("Error", message)
    }
}
