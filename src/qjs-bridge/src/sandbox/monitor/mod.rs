//! Execution monitoring for evaluations.
//!
//! This module provides the [`ExecutionMonitor`] trait and the built-in
//! [`WallClockMonitor`] for bounding an evaluation from outside the engine.
//!
//! # Two traits
//!
//! - [`ExecutionMonitor`] is what users implement: `get_monitor()` and `name()`.
//! - [`MonitorSet`] is sealed and derived automatically, for every
//!   `ExecutionMonitor` and for tuples of up to 5 of them. It produces one
//!   racing future that completes when the first monitor fires, recording
//!   which one won.
//!
//! [`Context::eval_with_monitor`](crate::Context::eval_with_monitor) bounds on
//! `M: MonitorSet`, so both single monitors and tuples can be passed.
//!
//! # Usage
//!
//! ```text
//! use qjs_bridge::{EvalOption, Runtime, SandboxPolicy, WallClockMonitor};
//! use std::time::Duration;
//!
//! let mut runtime = Runtime::new(SandboxPolicy::default())?;
//! let monitor = WallClockMonitor::new(Duration::from_secs(5))?;
//! let value = runtime.eval_with_monitor("main.js", [EvalOption::code("1 + 1")], &monitor)?;
//!
//! // Tuples race their monitors; the first to fire wins and its name is logged.
//! let value = runtime.eval_with_monitor("main.js", [EvalOption::code("2")], &(wall, other))?;
//! ```
//!
//! When a monitor fires it cancels the context's signal with
//! `DeadlineExceeded`. The engine notices on its next interrupt check and the
//! evaluation fails with [`Error::Interrupted`](crate::Error::Interrupted).
//!
//! # Custom Monitors
//!
//! ```text
//! use qjs_bridge::ExecutionMonitor;
//! use std::future::Future;
//!
//! struct MyMonitor { limit: std::time::Duration }
//!
//! impl ExecutionMonitor for MyMonitor {
//!     fn get_monitor(&self) -> anyhow::Result<impl Future<Output = ()> + Send + 'static> {
//!         let limit = self.limit;
//!         Ok(async move {
//!             qjs_bridge::monitor::sleep(limit).await;
//!             tracing::warn!("Custom limit exceeded");
//!         })
//!     }
//!
//!     fn name(&self) -> &'static str { "my-monitor" }
//! }
//! ```
//!
//! # Fail-Closed Semantics
//!
//! If any monitor fails to initialize (`get_monitor()` returns `Err`), the
//! evaluation is never started.
//!
//! # Runtime Configuration
//!
//! The shared async runtime thread count can be configured via environment variable:
//!
//! ```bash
//! export QJS_MONITOR_THREADS=4  # Default is 2
//! ```

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;

use crate::sandbox::metrics::{METRIC_MONITOR_TERMINATIONS, METRIC_MONITOR_TYPE_LABEL};

/// Record that a monitor fired.
///
/// Emits the `monitor_terminations_total` counter metric with the winning
/// monitor's name as the `monitor_type` label, and logs a warning.
fn record_monitor_triggered(triggered_by: &'static str) {
    metrics::counter!(
        METRIC_MONITOR_TERMINATIONS,
        METRIC_MONITOR_TYPE_LABEL => triggered_by
    )
    .increment(1);

    tracing::warn!("Monitor '{triggered_by}' fired, cancelling evaluation");
}

/// A monitor that bounds a single evaluation.
///
/// `get_monitor` runs synchronously on the calling thread and returns a future
/// that is spawned on the shared monitor runtime. The future stays pending
/// while execution is within limits and completes when it should stop. It is
/// aborted if the evaluation finishes first.
pub trait ExecutionMonitor: Send + Sync {
    /// Prepare the monitoring future for one evaluation.
    ///
    /// # Errors
    ///
    /// Return `Err` if the monitor cannot initialize. The evaluation is then
    /// never started.
    fn get_monitor(&self) -> Result<impl Future<Output = ()> + Send + 'static>;

    /// Human-readable name for logging and metrics.
    fn name(&self) -> &'static str;
}

/// Prevents external crates from implementing [`MonitorSet`] directly.
mod private {
    pub trait Sealed {}
}

/// A composable set of monitors that produces a single racing future.
///
/// Sealed: derived for every [`ExecutionMonitor`] and for tuples of up to 5
/// of them, with OR semantics.
pub trait MonitorSet: private::Sealed + Send + Sync {
    /// Produce a single future that completes when the first monitor fires.
    ///
    /// Each `get_monitor()` is called here, on the calling thread. The winner
    /// is logged and counted in `monitor_terminations_total`.
    fn to_race(&self) -> Result<Pin<Box<dyn Future<Output = ()> + Send>>>;
}

// Every ExecutionMonitor is automatically a MonitorSet of one.
impl<M: ExecutionMonitor> private::Sealed for M {}

impl<M: ExecutionMonitor> MonitorSet for M {
    fn to_race(&self) -> Result<Pin<Box<dyn Future<Output = ()> + Send>>> {
        let future = self.get_monitor()?;
        let name = self.name();
        Ok(Box::pin(async move {
            future.await;
            record_monitor_triggered(name);
        }))
    }
}

/// Generates a [`MonitorSet`] impl for a tuple of N `ExecutionMonitor`s,
/// racing their futures with `tokio::select!`.
macro_rules! impl_monitor_set_tuple {
    (($($p:ident: $P:ident),+)) => {
        impl<$($P: ExecutionMonitor),+> private::Sealed for ($($P,)+) {}

        impl<$($P: ExecutionMonitor),+> MonitorSet for ($($P,)+) {
            fn to_race(&self) -> Result<Pin<Box<dyn Future<Output = ()> + Send>>> {
                let ($($p,)+) = &self;
                $(let $p = ($p.get_monitor()?, $p.name());)+

                Ok(Box::pin(async move {
                    let winner = tokio::select! {
                        $(_ = $p.0 => $p.1,)+
                    };
                    record_monitor_triggered(winner);
                }))
            }
        }
    };
}

// `(T,)` and `T` are distinct types, so the 1-tuple does not overlap the blanket impl.
impl_monitor_set_tuple!((m0: M0));
impl_monitor_set_tuple!((m0: M0, m1: M1));
impl_monitor_set_tuple!((m0: M0, m1: M1, m2: M2));
impl_monitor_set_tuple!((m0: M0, m1: M1, m2: M2, m3: M3));
impl_monitor_set_tuple!((m0: M0, m1: M1, m2: M2, m3: M3, m4: M4));

#[cfg(feature = "monitor-wall-clock")]
mod wall_clock;
#[cfg(feature = "monitor-wall-clock")]
pub use wall_clock::WallClockMonitor;

// Shared runtime for monitor orchestration
pub(crate) mod runtime;

/// Async sleep for custom monitors, so they need not depend on `tokio` directly.
pub use tokio::time::sleep;
