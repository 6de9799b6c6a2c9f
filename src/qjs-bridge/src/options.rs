//! The option builder: typed effects folded into an engine-ready [`EvalOptions`].

use std::fmt;
use std::time::Duration;

use qjs_bridge_runtime::{EvalKind, EvalOptions, Source};

use crate::error::{Error, Result};

/// A named mutation applied to [`EvalOptions`] before an engine call.
///
/// Effects are applied in the order given; later effects win where they touch
/// the same field. `load` appends [`EvalOption::type_module`] after the
/// caller's effects, so module mode cannot be overridden there.
pub struct EvalOption(Box<dyn FnOnce(&mut EvalOptions) + Send>);

impl EvalOption {
    /// Wrap a caller-defined effect.
    pub fn new(effect: impl FnOnce(&mut EvalOptions) + Send + 'static) -> Self {
        Self(Box::new(effect))
    }

    /// Use `source` as inline code instead of reading the identifier as a file.
    pub fn code(source: impl Into<String>) -> Self {
        let source = source.into();
        Self::new(move |options| options.source = Source::Code(source))
    }

    /// Evaluate module bytecode produced by `compile`.
    pub fn bytecode(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Self::new(move |options| options.source = Source::Bytecode(bytes))
    }

    /// Interpret the source as a classic global script.
    pub fn type_global() -> Self {
        Self::new(|options| options.kind = EvalKind::Global)
    }

    /// Interpret the source as an ES module.
    pub fn type_module() -> Self {
        Self::new(|options| options.kind = EvalKind::Module)
    }

    /// Force strict mode.
    pub fn strict() -> Self {
        Self::new(|options| options.strict = true)
    }

    /// Hide stack frames below this evaluation.
    pub fn backtrace_barrier() -> Self {
        Self::new(|options| options.backtrace_barrier = true)
    }

    /// Allow top-level `await` in global scripts.
    pub fn top_level_await() -> Self {
        Self::new(|options| options.top_level_await = true)
    }

    /// Ceiling for this call, overriding the runtime's.
    pub fn max_execution_time(ceiling: Duration) -> Self {
        Self::new(move |options| options.max_execution_time = Some(ceiling))
    }

    fn apply(self, options: &mut EvalOptions) {
        (self.0)(options)
    }
}

impl fmt::Debug for EvalOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EvalOption(..)")
    }
}

/// Build the options for one call.
///
/// An empty identifier is rejected before anything is constructed.
pub(crate) fn build(
    filename: &str,
    effects: impl IntoIterator<Item = EvalOption>,
) -> Result<EvalOptions> {
    if filename.is_empty() {
        return Err(Error::InvalidFileName);
    }
    let mut options = EvalOptions::new(filename);
    for effect in effects {
        effect.apply(&mut options);
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifier_is_rejected() {
        let err = build("", [EvalOption::code("1")]).unwrap_err();
        assert!(matches!(err, Error::InvalidFileName));
    }

    #[test]
    fn effects_apply_in_order() {
        let options = build(
            "main.js",
            [
                EvalOption::type_module(),
                EvalOption::code("first"),
                EvalOption::type_global(),
                EvalOption::code("second"),
            ],
        )
        .unwrap();
        assert_eq!(options.kind, EvalKind::Global);
        assert_eq!(options.source, Source::Code("second".into()));
    }

    #[test]
    fn flags_and_ceiling_are_set() {
        let options = build(
            "main.js",
            [
                EvalOption::strict(),
                EvalOption::backtrace_barrier(),
                EvalOption::top_level_await(),
                EvalOption::max_execution_time(Duration::from_millis(5)),
            ],
        )
        .unwrap();
        assert!(options.strict);
        assert!(options.backtrace_barrier);
        assert!(options.top_level_await);
        assert_eq!(options.max_execution_time, Some(Duration::from_millis(5)));
        assert_eq!(options.source, Source::File);
    }

    #[test]
    fn custom_effects_see_the_identifier() {
        let options = build(
            "lib/entry.js",
            [EvalOption::new(|options| {
                options.source = Source::Code(format!("'{}'", options.filename))
            })],
        )
        .unwrap();
        assert_eq!(options.source, Source::Code("'lib/entry.js'".into()));
    }
}
