use crate::error::JsError;
use crate::options::EvalOptions;

/// An abrupt failure of an engine call.
///
/// Unlike a thrown exception, an abort means the engine's execution surface
/// went away mid-call (interrupted, torn down, past its deadline), and the call
/// produced no value at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{detail}")]
pub struct Abort {
    detail: String,
}

impl Abort {
    /// Create an abort carrying a best-effort description of what happened.
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    /// The description of the abort.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Consume the abort, returning its description.
    pub fn into_detail(self) -> String {
        self.detail
    }
}

/// The call surface of an embedded JavaScript engine.
///
/// Each call either returns a value (which may itself represent an error),
/// records an ambient exception and returns a placeholder value, or aborts.
/// At most one exception is pending at a time; [`Engine::take_exception`]
/// transfers it to the caller and clears it.
///
/// Engines are not reentrant: `&mut self` receivers serialize calls.
pub trait Engine {
    /// The engine's result representation. Dropping it releases it.
    type Value: EngineValue;

    /// Load an ES module.
    fn load(&mut self, options: &EvalOptions) -> Result<Self::Value, Abort>;

    /// Evaluate a script or module.
    fn eval(&mut self, options: &EvalOptions) -> Result<Self::Value, Abort>;

    /// Compile source to a value holding serialized bytecode.
    fn compile(&mut self, options: &EvalOptions) -> Result<Self::Value, Abort>;

    /// Whether the last call left an exception pending.
    fn has_exception(&self) -> bool;

    /// Take the pending exception, clearing it.
    fn take_exception(&mut self) -> Option<JsError>;
}

/// Read access to an engine value.
pub trait EngineValue {
    /// Whether the value is an error object returned as a normal value.
    fn is_error(&self) -> bool;

    /// The value converted to an exception.
    fn exception(&self) -> JsError;

    /// The raw bytes of the value. Only valid while the value is alive.
    fn as_bytes(&self) -> &[u8];

    /// The value converted to an integer, JavaScript `ToInt64` style.
    fn as_i64(&self) -> i64;

    /// The value converted to a string, JavaScript `String(value)` style.
    fn as_string(&self) -> String;
}
