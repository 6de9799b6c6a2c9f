//! The engine side of the bridge: a narrow call surface over an embedded
//! JavaScript engine, and [`QuickJs`], its QuickJS implementation.

mod engine;
mod error;
mod globals;
pub mod host;
mod interrupt;
mod modules;
mod options;
mod policy;
mod signal;
mod value;

use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use rquickjs::loader::{Loader, Resolver};
use rquickjs::module::WriteOptions;
use rquickjs::{CaughtError, Context, Ctx, Module, Runtime, Value};
use tracing::instrument;

pub use crate::engine::{Abort, Engine, EngineValue};
pub use crate::error::JsError;
pub use crate::globals::clock::FIXED_TIMESTAMP_MS;
use crate::host::Host;
use crate::interrupt::InterruptState;
use crate::modules::NativeModuleLoader;
pub use crate::options::{EvalKind, EvalOptions, Source};
pub use crate::policy::SandboxPolicy;
pub use crate::signal::{CancelCause, CancelSignal};
pub use crate::value::JsValue;

/// A QuickJS runtime and context implementing [`Engine`].
///
/// Failing calls leave a pending [`JsError`] and return [`JsValue::Undefined`].
/// Once an evaluation is interrupted (the shared [`CancelSignal`] fired, or the
/// execution-time ceiling passed) the engine is torn down and every later call
/// aborts.
pub struct QuickJs {
    context: Context,
    policy: SandboxPolicy,
    host: Option<Arc<dyn Host>>,
    interrupt: Arc<InterruptState>,
    pending: Option<JsError>,
    torn_down: Option<String>,
}

// SAFETY:
// `rquickjs::Context` is not `Send` because it holds a raw pointer, which Rust
// flags as a lint rather than as an actual safety concern (rquickjs itself
// implements `Send` for `Context` under its "parallel" feature). Every method
// that touches the context takes `&mut self`, so there are never concurrent
// accesses, and everything else the struct holds is `Send + Sync`.
unsafe impl Send for QuickJs {}

impl QuickJs {
    /// Create an engine without a module host.
    ///
    /// File sources are read from [`SandboxPolicy::cwd`] unless the filesystem
    /// is disabled, and only native modules (`console`) can be imported.
    pub fn new(policy: SandboxPolicy, signal: CancelSignal) -> anyhow::Result<Self> {
        Self::build(policy, signal, None)
    }

    /// Create an engine that resolves and loads modules and file sources through `host`.
    pub fn with_host(
        policy: SandboxPolicy,
        signal: CancelSignal,
        host: impl Host + 'static,
    ) -> anyhow::Result<Self> {
        Self::build(policy, signal, Some(Arc::new(host)))
    }

    #[instrument(skip_all, level = "info")]
    fn build(
        policy: SandboxPolicy,
        signal: CancelSignal,
        host: Option<Arc<dyn Host>>,
    ) -> anyhow::Result<Self> {
        let runtime = Runtime::new().context("Unable to initialize JS runtime")?;
        if let Some(limit) = policy.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = policy.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        if let Some(threshold) = policy.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }

        let interrupt = Arc::new(InterruptState::new(signal));
        let handler_state = interrupt.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || handler_state.should_interrupt())));

        // The loader must be in place before the globals are set up, since
        // `console` is itself a native module.
        match &host {
            Some(host) => {
                let loader = (NativeModuleLoader, ModuleLoader::new(host.clone()));
                runtime.set_loader(loader.clone(), loader);
            }
            None => runtime.set_loader(NativeModuleLoader, NativeModuleLoader),
        }

        let context = Context::full(&runtime).context("Unable to create JS context")?;
        context.with(|ctx| -> anyhow::Result<()> {
            globals::setup(&ctx, &policy).catch(&ctx)?;
            Ok(())
        })?;

        tracing::debug!(
            disable_filesystem = policy.disable_filesystem,
            disable_system_time = policy.disable_system_time,
            has_host = host.is_some(),
            "QuickJS engine ready"
        );

        Ok(Self {
            context,
            policy,
            host,
            interrupt,
            pending: None,
            torn_down: None,
        })
    }

    /// The policy the engine was built with.
    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// The signal the engine polls while evaluating.
    pub fn signal(&self) -> &CancelSignal {
        self.interrupt.signal()
    }

    /// Run a garbage collection cycle.
    pub fn run_gc(&mut self) {
        self.context.with(|ctx| ctx.run_gc());
    }

    fn ensure_alive(&self) -> Result<(), Abort> {
        match &self.torn_down {
            Some(reason) => Err(Abort::new(format!("engine torn down: {reason}"))),
            None => Ok(()),
        }
    }

    fn tear_down(&mut self, reason: String) -> Abort {
        tracing::warn!(%reason, "tearing down QuickJS engine");
        self.pending = None;
        self.torn_down = Some(reason.clone());
        Abort::new(reason)
    }

    /// Run script code with the interrupt handler armed.
    fn execute(&mut self, options: &EvalOptions) -> Result<JsValue, Abort> {
        self.ensure_alive()?;
        if let Some(cause) = self.interrupt.signal().cause() {
            return Err(self.tear_down(format!("evaluation not started: {cause}")));
        }

        let ceiling = options
            .max_execution_time
            .or(self.policy.max_execution_time);
        let interrupt = self.interrupt.clone();
        let result = {
            let _armed = interrupt.arm(ceiling);
            self.context.with(|ctx| self.evaluate(&ctx, options))
        };

        if let Some(cause) = interrupt.fired() {
            return Err(self.tear_down(format!("execution interrupted: {cause}")));
        }
        Ok(self.settle(result))
    }

    fn settle(&mut self, result: Result<JsValue, JsError>) -> JsValue {
        match result {
            Ok(value) => value,
            Err(error) => {
                tracing::debug!(%error, "engine call raised an exception");
                self.pending = Some(error);
                JsValue::Undefined
            }
        }
    }

    fn evaluate<'js>(&self, ctx: &Ctx<'js>, options: &EvalOptions) -> Result<JsValue, JsError> {
        if options.is_module() {
            let module = self.declare(ctx, options)?;
            let (module, promise) = module.eval().catch(ctx)?;
            promise.finish::<()>().catch(ctx)?;
            let namespace = module.namespace().catch(ctx)?;
            return JsValue::snapshot(ctx, namespace.into_value()).catch(ctx);
        }

        let (_, source) = self.source(options)?;
        let mut eval_options = rquickjs::context::EvalOptions::default();
        eval_options.global = true;
        eval_options.strict = options.strict;
        eval_options.backtrace_barrier = options.backtrace_barrier;
        eval_options.promise = options.top_level_await;

        let value: Value = ctx.eval_with_options(source, eval_options).catch(ctx)?;
        let value = if options.top_level_await
            && let Some(promise) = value.as_promise()
        {
            let settled: Value = promise.clone().finish().catch(ctx)?;
            // async evaluation resolves to a `{ value }` completion record
            match settled.as_object() {
                Some(record) => record.get::<_, Value>("value").catch(ctx)?,
                None => settled,
            }
        } else {
            value
        };
        JsValue::snapshot(ctx, value).catch(ctx)
    }

    fn declare<'js>(
        &self,
        ctx: &Ctx<'js>,
        options: &EvalOptions,
    ) -> Result<Module<'js, rquickjs::module::Declared>, JsError> {
        if let Source::Bytecode(bytes) = &options.source {
            // SAFETY: QuickJS validates the bytecode header and rejects
            // buffers it did not write; callers pass output of `compile`.
            return unsafe { Module::load(ctx.clone(), bytes) }.catch(ctx);
        }
        let (name, source) = self.source(options)?;
        Module::declare(ctx.clone(), name, source).catch(ctx)
    }

    /// The module name and source text for a code or file source.
    fn source(&self, options: &EvalOptions) -> Result<(String, String), JsError> {
        match &options.source {
            Source::Code(code) => Ok((options.filename.clone(), code.clone())),
            Source::File => self
                .read_file(&options.filename)
                .map_err(|e| JsError::internal(format!("{e:#}"))),
            Source::Bytecode(_) => Err(JsError::new(
                "TypeError",
                "bytecode can only be evaluated as a module",
            )),
        }
    }

    fn read_file(&self, filename: &str) -> anyhow::Result<(String, String)> {
        if let Some(host) = &self.host {
            let specifier = if is_path_like(filename) {
                filename.to_string()
            } else {
                format!("./{filename}")
            };
            let path = host.resolve_module(".", &specifier)?;
            let source = host.load_module(&path)?;
            return Ok((path, source));
        }
        if self.policy.disable_filesystem {
            return Err(anyhow!(
                "filesystem access is disabled, cannot read {filename}"
            ));
        }
        let path = self.policy.root().join(filename);
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("Unable to read {}", path.display()))?;
        Ok((filename.to_string(), source))
    }
}

impl Engine for QuickJs {
    type Value = JsValue;

    #[instrument(skip_all, fields(filename = %options.filename), level = "debug")]
    fn load(&mut self, options: &EvalOptions) -> Result<JsValue, Abort> {
        self.execute(options)
    }

    #[instrument(skip_all, fields(filename = %options.filename), level = "debug")]
    fn eval(&mut self, options: &EvalOptions) -> Result<JsValue, Abort> {
        self.execute(options)
    }

    #[instrument(skip_all, fields(filename = %options.filename), level = "debug")]
    fn compile(&mut self, options: &EvalOptions) -> Result<JsValue, Abort> {
        self.ensure_alive()?;
        let result = self.context.with(|ctx| {
            if let Source::Bytecode(bytes) = &options.source {
                return Ok(JsValue::Bytes(bytes.clone()));
            }
            let (name, source) = self.source(options)?;
            let module = Module::declare(ctx.clone(), name, source).catch(&ctx)?;
            module
                .write(WriteOptions::default())
                .map(JsValue::Bytes)
                .catch(&ctx)
        });
        Ok(self.settle(result))
    }

    fn has_exception(&self) -> bool {
        self.pending.is_some()
    }

    fn take_exception(&mut self) -> Option<JsError> {
        self.pending.take()
    }
}

fn is_path_like(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

// A module loader that calls out to the host to resolve and load modules
#[derive(Clone)]
struct ModuleLoader {
    host: Arc<dyn Host>,
}

impl ModuleLoader {
    fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

impl Resolver for ModuleLoader {
    fn resolve(&mut self, _ctx: &Ctx<'_>, base: &str, name: &str) -> rquickjs::Result<String> {
        // quickjs passes the importing module's name, the host expects its directory
        let (dir, _) = base.rsplit_once('/').unwrap_or((".", ""));
        let dir = if dir.is_empty() { "/" } else { dir };

        let path = self.host.resolve_module(dir, name).map_err(|err| {
            tracing::debug!(base, name, error = %err, "module resolution failed");
            rquickjs::Error::new_resolving(base, name)
        })?;
        tracing::debug!(base, name, %path, "resolved module");

        // windows paths come back with backslashes
        Ok(path.replace('\\', "/"))
    }
}

impl Loader for ModuleLoader {
    fn load<'js>(&mut self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Module<'js>> {
        let source = self.host.load_module(name).map_err(|err| {
            tracing::debug!(name, error = %err, "module load failed");
            rquickjs::Error::new_loading(name)
        })?;
        Module::declare(ctx.clone(), name, source)
    }
}

trait CatchJsErrorExt {
    type Ok;
    fn catch(self, ctx: &Ctx<'_>) -> Result<Self::Ok, JsError>;
}

impl<T> CatchJsErrorExt for rquickjs::Result<T> {
    type Ok = T;
    fn catch(self, ctx: &Ctx<'_>) -> Result<T, JsError> {
        rquickjs::CatchResultExt::catch(self, ctx).map_err(|caught| match caught {
            CaughtError::Exception(exception) => JsError::from_exception(&exception),
            CaughtError::Value(value) => JsError::from_thrown(ctx, value),
            CaughtError::Error(error) => JsError::internal(error.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn engine(policy: SandboxPolicy) -> QuickJs {
        QuickJs::new(policy, CancelSignal::new()).unwrap()
    }

    fn code(src: &str) -> EvalOptions {
        let mut options = EvalOptions::new("test.js");
        options.source = Source::Code(src.to_string());
        options
    }

    fn module(src: &str) -> EvalOptions {
        let mut options = code(src);
        options.kind = EvalKind::Module;
        options
    }

    #[test]
    fn evaluates_global_scripts() {
        let mut js = engine(SandboxPolicy::default());
        let value = js.eval(&code("1 + 2")).unwrap();
        assert_eq!(value, JsValue::Int(3));
        assert!(!js.has_exception());

        let value = js.eval(&code("'a' + 'b'")).unwrap();
        assert_eq!(value.as_string(), "ab");
    }

    #[test]
    fn globals_persist_between_evaluations() {
        let mut js = engine(SandboxPolicy::default());
        js.eval(&code("var counter = 41;")).unwrap();
        assert_eq!(js.eval(&code("++counter")).unwrap().as_i64(), 42);
    }

    #[test]
    fn thrown_errors_become_pending_exceptions() {
        let mut js = engine(SandboxPolicy::default());
        let value = js.eval(&code("null.x")).unwrap();
        assert_eq!(value, JsValue::Undefined);
        assert!(js.has_exception());
        let error = js.take_exception().unwrap();
        assert_eq!(error.name, "TypeError");
        assert!(!js.has_exception());
    }

    #[test]
    fn thrown_non_errors_are_stringified() {
        let mut js = engine(SandboxPolicy::default());
        js.eval(&code("throw 'oops'")).unwrap();
        assert_eq!(js.take_exception().unwrap().message, "oops");
    }

    #[test]
    fn returned_errors_are_error_values() {
        let mut js = engine(SandboxPolicy::default());
        let value = js.eval(&code("new RangeError('too far')")).unwrap();
        assert!(value.is_error());
        assert_eq!(value.exception().message, "too far");
        assert!(!js.has_exception());
    }

    #[test]
    fn export_is_a_syntax_error_in_global_scripts() {
        let mut js = engine(SandboxPolicy::default());
        js.eval(&code("export const x = 1;")).unwrap();
        assert_eq!(js.take_exception().unwrap().name, "SyntaxError");
    }

    #[test]
    fn modules_evaluate_to_their_namespace() {
        let mut js = engine(SandboxPolicy::default());
        let value = js
            .load(&module("export const answer = 42; export const name = 'q';"))
            .unwrap();
        assert_eq!(
            value.to_json(),
            Some(serde_json::json!({"answer": 42, "name": "q"}))
        );
    }

    #[test]
    fn strict_mode_rejects_undeclared_assignment() {
        let mut js = engine(SandboxPolicy::default());
        js.eval(&code("undeclaredSloppy = 1")).unwrap();
        assert!(!js.has_exception());

        let mut options = code("undeclaredStrict = 1");
        options.strict = true;
        js.eval(&options).unwrap();
        assert_eq!(js.take_exception().unwrap().name, "ReferenceError");
    }

    #[test]
    fn compiled_bytecode_evaluates_as_a_module() {
        let mut js = engine(SandboxPolicy::default());
        let bytes = js.compile(&module("export const n = 6 * 7;")).unwrap();
        let JsValue::Bytes(bytes) = bytes else {
            panic!("compile did not produce bytes");
        };
        assert!(!bytes.is_empty());

        let mut options = EvalOptions::new("compiled.js");
        options.source = Source::Bytecode(bytes);
        let value = js.eval(&options).unwrap();
        assert_eq!(value.to_json(), Some(serde_json::json!({"n": 42})));
    }

    #[test]
    fn compile_reports_syntax_errors() {
        let mut js = engine(SandboxPolicy::default());
        js.compile(&module("export const = ;")).unwrap();
        assert_eq!(js.take_exception().unwrap().name, "SyntaxError");
    }

    #[test]
    fn execution_ceiling_interrupts_and_tears_down() {
        let mut js = engine(SandboxPolicy {
            max_execution_time: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let abort = js.eval(&code("while (true) {}")).unwrap_err();
        assert!(abort.detail().contains("deadline exceeded"), "{abort}");
        assert_eq!(js.signal().cause(), Some(CancelCause::DeadlineExceeded));
        assert!(!js.has_exception());

        let abort = js.eval(&code("1")).unwrap_err();
        assert!(abort.detail().contains("torn down"), "{abort}");
    }

    #[test]
    fn per_call_ceiling_overrides_policy() {
        let mut js = engine(SandboxPolicy::default());
        let mut options = code("while (true) {}");
        options.max_execution_time = Some(Duration::from_millis(20));
        assert!(js.eval(&options).is_err());
    }

    #[test]
    fn cancelled_signal_aborts_before_running() {
        let signal = CancelSignal::new();
        let mut js = QuickJs::new(SandboxPolicy::default(), signal.clone()).unwrap();
        signal.cancel();
        let abort = js.eval(&code("1")).unwrap_err();
        assert!(abort.detail().contains("context canceled"), "{abort}");
    }

    #[test]
    fn system_time_can_be_pinned() {
        let mut js = engine(SandboxPolicy {
            disable_system_time: true,
            ..Default::default()
        });
        for src in ["Date.now()", "new Date().getTime()", "+new Date()"] {
            let value = js.eval(&code(src)).unwrap();
            assert_eq!(value.as_i64(), 1_640_995_200_000, "{src}");
        }
        let explicit = js
            .eval(&code("new Date(Date.UTC(2020, 0, 1)).getUTCFullYear()"))
            .unwrap();
        assert_eq!(explicit.as_i64(), 2020);
        let instance = js.eval(&code("new Date() instanceof Date")).unwrap();
        assert_eq!(instance, JsValue::Bool(true));
    }

    #[test]
    fn pinned_clock_builds_and_freezes_performance_now() {
        let mut js = engine(SandboxPolicy {
            disable_system_time: true,
            ..Default::default()
        });
        let value = js
            .eval(&code(
                "typeof performance === 'object' ? performance.now() + performance.now() : 0",
            ))
            .unwrap();
        assert_eq!(value.as_i64(), 0);
        assert!(!js.has_exception());

        // scripts may still replace the pinned functions themselves
        let value = js
            .eval(&code("Date.now = () => 1; Date.now()"))
            .unwrap();
        assert_eq!(value.as_i64(), 1);
    }

    #[test]
    fn bigint_exports_snapshot_as_strings() {
        let mut js = engine(SandboxPolicy::default());
        let value = js
            .load(&module("export const big = 10n; export const n = 1;"))
            .unwrap();
        assert!(!js.has_exception());
        assert_eq!(
            value.to_json(),
            Some(serde_json::json!({"big": "10", "n": 1}))
        );
    }

    #[test]
    fn objects_without_json_form_are_still_values() {
        let mut js = engine(SandboxPolicy::default());
        let value = js.eval(&code("var a = {}; a.self = a; a")).unwrap();
        assert!(!js.has_exception());
        assert_eq!(value, JsValue::Other("object".to_string()));

        let value = js
            .eval(&code("({ toJSON() { throw new Error('no'); } })"))
            .unwrap();
        assert!(!js.has_exception());
        assert_eq!(value, JsValue::Other("object".to_string()));

        // the cleared exception does not leak into the next call
        assert_eq!(js.eval(&code("2")).unwrap(), JsValue::Int(2));
        assert!(!js.has_exception());
    }

    #[test]
    fn system_time_is_real_by_default() {
        let mut js = engine(SandboxPolicy::default());
        let now = js.eval(&code("Date.now()")).unwrap().as_i64();
        assert!(now > 1_640_995_200_000);
    }

    #[test]
    fn file_sources_are_read_from_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.js"), "20 + 22").unwrap();
        let mut js = engine(SandboxPolicy {
            cwd: Some(dir.path().to_path_buf()),
            ..Default::default()
        });
        let value = js.eval(&EvalOptions::new("main.js")).unwrap();
        assert_eq!(value.as_i64(), 42);
    }

    #[test]
    fn file_sources_fail_when_filesystem_is_disabled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.js"), "1").unwrap();
        let mut js = engine(SandboxPolicy {
            disable_filesystem: true,
            cwd: Some(dir.path().to_path_buf()),
            ..Default::default()
        });
        js.eval(&EvalOptions::new("main.js")).unwrap();
        let error = js.take_exception().unwrap();
        assert!(error.message.contains("filesystem access is disabled"));
    }

    #[test]
    fn imports_without_a_host_only_see_native_modules() {
        let mut js = engine(SandboxPolicy::default());
        js.load(&module("import { log } from 'console'; log('hi');"))
            .unwrap();
        assert!(!js.has_exception());

        js.load(&module("import { x } from './other.js';")).unwrap();
        assert!(js.take_exception().is_some());
    }

    #[test]
    fn console_is_available_as_a_global() {
        let mut js = engine(SandboxPolicy::default());
        js.eval(&code("console.log('hello', 1, true); console.error('bad')"))
            .unwrap();
        assert!(!js.has_exception());
    }

    #[test]
    fn memory_limit_is_enforced() {
        let mut js = engine(SandboxPolicy {
            memory_limit: Some(4 * 1024 * 1024),
            ..Default::default()
        });
        js.eval(&code("let a = []; while (true) { a.push(new Array(1024).fill(1)); }"))
            .unwrap();
        assert!(js.take_exception().is_some());
    }
}
