/*!
This module contains the definitions and implementations of the metrics used by the sandbox module
*/

use qjs_bridge_runtime::CancelCause;
use tracing::{Level, instrument};

use crate::Runtime;

// Gauges, active runtimes
static METRIC_ACTIVE_JS_RUNTIMES: &str = "active_js_runtimes";

// Counters, total runtimes created during lifetime of the process
static METRIC_TOTAL_JS_RUNTIMES: &str = "js_runtimes_total";

// Counters, evaluations ended by an interruption or abort
pub(crate) static METRIC_EVAL_INTERRUPTIONS: &str = "eval_interruptions_total";
pub(crate) static METRIC_INTERRUPTION_KIND_LABEL: &str = "kind";

// Counters, execution monitor terminations
pub(crate) static METRIC_MONITOR_TERMINATIONS: &str = "monitor_terminations_total";
pub(crate) static METRIC_MONITOR_TYPE_LABEL: &str = "monitor_type";

// Histograms, duration of each operation
#[cfg(feature = "function_call_metrics")]
static METRIC_OPERATION_DURATION: &str = "js_operation_duration_micros";
#[cfg(feature = "function_call_metrics")]
static METRIC_OPERATION_LABEL: &str = "operation";

pub(crate) trait SandboxMetricsTrait {
    const GAUGE: &'static str;
    const COUNTER: &'static str;
}

pub(crate) struct SandboxMetricsGuard<T: SandboxMetricsTrait>(std::marker::PhantomData<T>);

impl<T: SandboxMetricsTrait> SandboxMetricsGuard<T> {
    #[instrument(skip_all, level=Level::DEBUG)]
    pub(crate) fn new() -> Self {
        metrics::gauge!(T::GAUGE).increment(1);
        metrics::counter!(T::COUNTER).increment(1);
        Self(std::marker::PhantomData)
    }
}

impl<T: SandboxMetricsTrait> Drop for SandboxMetricsGuard<T> {
    #[instrument(skip_all, level=Level::DEBUG)]
    fn drop(&mut self) {
        metrics::gauge!(T::GAUGE).decrement(1);
    }
}

impl SandboxMetricsTrait for Runtime {
    const GAUGE: &'static str = METRIC_ACTIVE_JS_RUNTIMES;
    const COUNTER: &'static str = METRIC_TOTAL_JS_RUNTIMES;
}

/// Records the duration of one load, eval or compile call when dropped.
#[cfg(feature = "function_call_metrics")]
pub(crate) struct OperationMetricGuard {
    operation: &'static str,
    start: std::time::Instant,
}

#[cfg(feature = "function_call_metrics")]
impl OperationMetricGuard {
    pub(crate) fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "function_call_metrics")]
impl Drop for OperationMetricGuard {
    fn drop(&mut self) {
        metrics::histogram!(METRIC_OPERATION_DURATION, METRIC_OPERATION_LABEL => self.operation)
            .record(self.start.elapsed().as_micros() as f64);
    }
}

/// Count an interrupted (`Some(cause)`) or aborted (`None`) evaluation.
pub(crate) fn record_interruption(cause: Option<CancelCause>) {
    let kind = match cause {
        Some(CancelCause::Canceled) => "canceled",
        Some(CancelCause::DeadlineExceeded) => "deadline_exceeded",
        None => "aborted",
    };
    metrics::counter!(METRIC_EVAL_INTERRUPTIONS, METRIC_INTERRUPTION_KIND_LABEL => kind)
        .increment(1);
}
