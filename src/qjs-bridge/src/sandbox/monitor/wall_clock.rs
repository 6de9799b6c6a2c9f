//! A monitor that cancels evaluations after a fixed span of real time.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Result, ensure};

use super::ExecutionMonitor;

/// Cancels an evaluation once `timeout` of real time has passed since it began.
///
/// Time the script spends blocked counts too. The engine-side
/// [`SandboxPolicy::max_execution_time`](crate::SandboxPolicy::max_execution_time)
/// ceiling needs no monitor thread; this one can be raced against other
/// monitors in a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClockMonitor {
    timeout: Duration,
}

impl WallClockMonitor {
    /// Fails when `timeout` is zero.
    pub fn new(timeout: Duration) -> Result<Self> {
        ensure!(!timeout.is_zero(), "wall-clock timeout must be non-zero");
        Ok(Self { timeout })
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl ExecutionMonitor for WallClockMonitor {
    fn get_monitor(&self) -> Result<impl Future<Output = ()> + Send + 'static> {
        let timeout = self.timeout;
        let started = Instant::now();
        Ok(async move {
            super::sleep(timeout).await;
            tracing::warn!(
                ?timeout,
                elapsed = ?started.elapsed(),
                "evaluation overran its wall-clock budget"
            );
        })
    }

    fn name(&self) -> &'static str {
        "wall-clock"
    }
}
