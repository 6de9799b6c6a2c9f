use qjs_bridge_runtime::{CancelSignal, JsValue, QuickJs, SandboxPolicy};
use tracing::{Level, instrument};

use super::metrics::SandboxMetricsGuard;
use super::monitor::MonitorSet;
use super::runtime_builder::RuntimeBuilder;
use crate::context::Context;
use crate::error::Result;
use crate::options::EvalOption;

/// A QuickJS engine built with a [`SandboxPolicy`], behind the bridge pipeline.
pub struct Runtime {
    context: Context<QuickJs>,
    // metric drop guard to manage runtime metrics
    _metric_guard: SandboxMetricsGuard<Runtime>,
}

impl Runtime {
    /// Build a runtime with `policy` and a fresh cancel signal.
    pub fn new(policy: SandboxPolicy) -> Result<Self> {
        RuntimeBuilder::from_policy(policy).build()
    }

    /// A builder for a runtime.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(super) fn from_engine(engine: QuickJs, signal: CancelSignal) -> Self {
        Self {
            context: Context::new(engine, signal),
            _metric_guard: SandboxMetricsGuard::new(),
        }
    }

    /// The policy the runtime was built with.
    pub fn policy(&self) -> &SandboxPolicy {
        self.context.engine().policy()
    }

    /// Load `filename` as an ES module, returning its namespace.
    #[instrument(err(Debug), skip(self, effects), level=Level::INFO)]
    pub fn load(
        &mut self,
        filename: &str,
        effects: impl IntoIterator<Item = EvalOption>,
    ) -> Result<JsValue> {
        self.context.load(filename, effects)
    }

    /// Evaluate `filename`.
    #[instrument(err(Debug), skip(self, effects), level=Level::INFO)]
    pub fn eval(
        &mut self,
        filename: &str,
        effects: impl IntoIterator<Item = EvalOption>,
    ) -> Result<JsValue> {
        self.context.eval(filename, effects)
    }

    /// Evaluate `filename` under an execution monitor.
    pub fn eval_with_monitor<M: MonitorSet>(
        &mut self,
        filename: &str,
        effects: impl IntoIterator<Item = EvalOption>,
        monitor: &M,
    ) -> Result<JsValue> {
        self.context.eval_with_monitor(filename, effects, monitor)
    }

    /// Compile `filename` to module bytecode.
    #[instrument(err(Debug), skip(self, effects), level=Level::INFO)]
    pub fn compile(
        &mut self,
        filename: &str,
        effects: impl IntoIterator<Item = EvalOption>,
    ) -> Result<Vec<u8>> {
        self.context.compile(filename, effects)
    }

    /// The runtime's cancel signal.
    pub fn signal(&self) -> &CancelSignal {
        self.context.signal()
    }

    /// Fire the cancel signal.
    pub fn cancel(&self) {
        self.context.cancel();
    }

    /// Returns whether the runtime is poisoned.
    ///
    /// A runtime is poisoned once an evaluation was interrupted or the engine
    /// aborted. Every later evaluation fails; build a new runtime instead.
    pub fn poisoned(&self) -> bool {
        self.context.poisoned()
    }

    /// Run a garbage collection cycle.
    pub fn run_gc(&mut self) {
        self.context.engine_mut().run_gc();
    }

    /// The underlying pipeline context.
    pub fn context(&mut self) -> &mut Context<QuickJs> {
        &mut self.context
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("policy", self.policy())
            .field("poisoned", &self.poisoned())
            .finish()
    }
}
