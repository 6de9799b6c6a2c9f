//! The execution pipeline: load, eval and compile against one engine.

use std::iter;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use qjs_bridge_runtime::{CancelCause, CancelSignal, Engine, EngineValue, EvalOptions};
use tokio::task::JoinHandle;
use tracing::{Level, instrument};

use crate::error::{Error, Result};
use crate::guard::guard;
use crate::normalize::normalize;
use crate::options::{EvalOption, build};
#[cfg(feature = "function_call_metrics")]
use crate::sandbox::metrics::OperationMetricGuard;
use crate::sandbox::metrics::record_interruption;
use crate::sandbox::monitor::MonitorSet;
use crate::sandbox::monitor::runtime::get_monitor_runtime;

/// One engine execution context and its cancel signal.
///
/// Calls take `&mut self`, so at most one operation is in flight per context.
/// Once the signal fires every later `eval` fails with [`Error::Interrupted`].
pub struct Context<E: Engine> {
    engine: E,
    signal: CancelSignal,
    poisoned: bool,
}

/// RAII guard that aborts a spawned monitor task on drop.
struct MonitorTask(JoinHandle<()>);

const GATE_RUNNING: u8 = 0;
const GATE_FINISHED: u8 = 1;
const GATE_FIRED: u8 = 2;

/// Move `gate` out of the running state. Only the first claimant succeeds.
fn claim(gate: &AtomicU8, state: u8) -> bool {
    gate.compare_exchange(GATE_RUNNING, state, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

impl Drop for MonitorTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<E: Engine> Context<E> {
    /// Wrap `engine`. `signal` should be the signal the engine polls, if it polls one.
    pub fn new(engine: E, signal: CancelSignal) -> Self {
        Self {
            engine,
            signal,
            poisoned: false,
        }
    }

    /// The context's cancel signal.
    pub fn signal(&self) -> &CancelSignal {
        &self.signal
    }

    /// Fire the cancel signal. In-flight and later evaluations are interrupted.
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    /// Whether a call on this context was interrupted or aborted.
    ///
    /// A poisoned context should be discarded.
    pub fn poisoned(&self) -> bool {
        self.poisoned
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The wrapped engine, mutably.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Load `filename` as an ES module.
    ///
    /// Module mode is forced after the caller's effects, so a
    /// [`EvalOption::type_global`] passed here has no effect.
    #[instrument(err(Debug), skip(self, effects), level=Level::INFO)]
    pub fn load(
        &mut self,
        filename: &str,
        effects: impl IntoIterator<Item = EvalOption>,
    ) -> Result<E::Value> {
        let options = build(
            filename,
            effects
                .into_iter()
                .chain(iter::once(EvalOption::type_module())),
        )?;
        #[cfg(feature = "function_call_metrics")]
        let _metric_guard = OperationMetricGuard::new("load");

        let result = self
            .engine
            .load(&options)
            .map_err(Error::from)
            .and_then(|value| normalize(&mut self.engine, value));
        self.track(result)
    }

    /// Evaluate `filename`, by default as a global script read from disk.
    ///
    /// Panics and aborts from the engine are caught and reported as
    /// [`Error::Interrupted`] when the signal has fired, and
    /// [`Error::Aborted`] otherwise.
    #[instrument(err(Debug), skip(self, effects), level=Level::INFO)]
    pub fn eval(
        &mut self,
        filename: &str,
        effects: impl IntoIterator<Item = EvalOption>,
    ) -> Result<E::Value> {
        let options = build(filename, effects)?;
        self.eval_options(&options)
    }

    /// Evaluate `filename` while `monitor` races it on the shared monitor runtime.
    ///
    /// When the monitor fires, the signal is cancelled with
    /// [`CancelCause::DeadlineExceeded`], which interrupts the evaluation. A
    /// monitor that fires once the call has returned has no effect, and one
    /// that fires as the engine returns still fails the call. If the monitor
    /// cannot start, nothing is evaluated.
    #[instrument(err(Debug), skip(self, effects, monitor), level=Level::INFO)]
    pub fn eval_with_monitor<M: MonitorSet>(
        &mut self,
        filename: &str,
        effects: impl IntoIterator<Item = EvalOption>,
        monitor: &M,
    ) -> Result<E::Value> {
        let options = build(filename, effects)?;

        let racing_future = monitor.to_race().map_err(|e| {
            tracing::error!("Failed to initialize execution monitor: {:#}", e);
            Error::Monitor(format!("{e:#}"))
        })?;
        let runtime = get_monitor_runtime().ok_or_else(|| {
            tracing::error!("Monitor runtime is unavailable");
            Error::Monitor("monitor runtime is unavailable".to_string())
        })?;

        let gate = Arc::new(AtomicU8::new(GATE_RUNNING));
        let task_gate = gate.clone();
        let signal = self.signal.clone();
        let monitor_task = MonitorTask(runtime.spawn(async move {
            racing_future.await;
            // only a monitor that fires while the call is running may cancel
            if claim(&task_gate, GATE_FIRED) {
                signal.cancel_with(CancelCause::DeadlineExceeded);
            }
        }));

        let result = self.eval_options(&options);
        let fired = !claim(&gate, GATE_FINISHED);
        drop(monitor_task);

        match result {
            Ok(_) if fired => {
                // the engine finished, but not before the monitor claimed the call
                self.signal.cancel_with(CancelCause::DeadlineExceeded);
                tracing::warn!("monitor fired as the evaluation returned");
                record_interruption(Some(CancelCause::DeadlineExceeded));
                self.track(Err(Error::Interrupted(CancelCause::DeadlineExceeded)))
            }
            result => result,
        }
    }

    /// Compile `filename` to bytecode.
    ///
    /// The bytes are copied out before the engine value is released, so they
    /// stay valid whatever the engine does afterwards.
    #[instrument(err(Debug), skip(self, effects), level=Level::INFO)]
    pub fn compile(
        &mut self,
        filename: &str,
        effects: impl IntoIterator<Item = EvalOption>,
    ) -> Result<Vec<u8>> {
        let options = build(filename, effects)?;
        #[cfg(feature = "function_call_metrics")]
        let _metric_guard = OperationMetricGuard::new("compile");

        let result = self
            .engine
            .compile(&options)
            .map_err(Error::from)
            .and_then(|value| normalize(&mut self.engine, value))
            .map(|value| {
                let bytes = value.as_bytes().to_vec();
                drop(value);
                bytes
            });
        self.track(result)
    }

    fn eval_options(&mut self, options: &EvalOptions) -> Result<E::Value> {
        #[cfg(feature = "function_call_metrics")]
        let _metric_guard = OperationMetricGuard::new("eval");

        let engine = &mut self.engine;
        let result = guard(&self.signal, || {
            if self.signal.is_cancelled() {
                return Err(Error::Aborted("context already cancelled".to_string()));
            }
            let value = engine.eval(options)?;
            normalize(engine, value)
        });
        self.track(result)
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(error) = &result
            && error.is_fatal()
        {
            self.poisoned = true;
        }
        result
    }
}
