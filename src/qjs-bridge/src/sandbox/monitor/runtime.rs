//! Shared Tokio runtime for execution monitor orchestration.
//!
//! [`Context::eval_with_monitor`](crate::Context::eval_with_monitor) spawns
//! monitor futures here instead of starting OS threads per evaluation.
//!
//! The worker count is read from `QJS_MONITOR_THREADS` the first time a
//! monitor is used.

use std::sync::LazyLock;

use tokio::runtime::Runtime;

/// Environment variable to configure the number of monitor runtime worker threads.
pub(crate) const ENV_MONITOR_THREADS: &str = "QJS_MONITOR_THREADS";

/// Default number of worker threads for the monitor runtime.
const DEFAULT_MONITOR_RUNTIME_WORKERS: usize = 2;

/// Shared Tokio runtime for all execution monitors.
///
/// Lazily initialized on first access. A creation failure is cached as `None`
/// and never retried.
static MONITOR_RUNTIME: LazyLock<Option<Runtime>> = LazyLock::new(|| {
    let workers = worker_count(std::env::var(ENV_MONITOR_THREADS).ok().as_deref());

    match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .thread_name("qjs-exec-monitor")
        .enable_time()
        .build()
    {
        Ok(rt) => {
            tracing::debug!(workers, "Initialized monitor runtime");
            Some(rt)
        }
        Err(e) => {
            tracing::error!(
                "Failed to create execution monitor runtime: {}. Monitors will be unavailable.",
                e
            );
            None
        }
    }
});

fn worker_count(configured: Option<&str>) -> usize {
    configured
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_MONITOR_RUNTIME_WORKERS)
}

/// Get the shared monitor runtime, or `None` if it could not be created.
pub(crate) fn get_monitor_runtime() -> Option<&'static Runtime> {
    MONITOR_RUNTIME.as_ref()
}
