use std::time::Duration;

/// Where the source of an evaluation comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Source {
    /// Read the file named by [`EvalOptions::filename`] through the module host.
    #[default]
    File,
    /// Inline source code.
    Code(String),
    /// Module bytecode previously produced by a compile call.
    Bytecode(Vec<u8>),
}

/// How the source is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvalKind {
    /// A classic script evaluated in the global scope.
    #[default]
    Global,
    /// An ES module.
    Module,
}

/// The engine-ready options for one load, eval or compile call.
///
/// Created per call and owned by the call that created it; it is released when
/// that call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalOptions {
    /// Source identifier: the file path for [`Source::File`], otherwise the
    /// name used in stack traces and as the base for relative imports.
    pub filename: String,
    /// Source form.
    pub source: Source,
    /// Script or module interpretation.
    pub kind: EvalKind,
    /// Force strict mode for global scripts.
    pub strict: bool,
    /// Hide stack frames below this evaluation.
    pub backtrace_barrier: bool,
    /// Allow top-level `await` in global scripts and await the result.
    pub top_level_await: bool,
    /// Execution-time ceiling for this call, overriding the runtime's ceiling.
    pub max_execution_time: Option<Duration>,
}

impl EvalOptions {
    /// Options for evaluating `filename` as a global script read from disk.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            source: Source::File,
            kind: EvalKind::Global,
            strict: false,
            backtrace_barrier: false,
            top_level_await: false,
            max_execution_time: None,
        }
    }

    /// Whether the call evaluates an ES module. Bytecode is always module bytecode.
    pub fn is_module(&self) -> bool {
        self.kind == EvalKind::Module || matches!(self.source, Source::Bytecode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_global_file_source() {
        let options = EvalOptions::new("main.js");
        assert_eq!(options.filename, "main.js");
        assert_eq!(options.source, Source::File);
        assert_eq!(options.kind, EvalKind::Global);
        assert!(!options.is_module());
    }

    #[test]
    fn bytecode_is_always_a_module() {
        let mut options = EvalOptions::new("main.js");
        options.source = Source::Bytecode(vec![1, 2, 3]);
        assert!(options.is_module());
    }
}
