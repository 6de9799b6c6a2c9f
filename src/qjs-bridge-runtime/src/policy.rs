use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Construction-time restrictions for one engine.
///
/// Resolved once when the engine is built and immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxPolicy {
    /// Refuse every host filesystem read. In-memory module sets are still allowed.
    pub disable_filesystem: bool,
    /// Make `Date` and `performance.now` report a fixed instant instead of real time.
    pub disable_system_time: bool,
    /// Ceiling for each evaluation. Exceeding it cancels the engine's signal.
    pub max_execution_time: Option<Duration>,
    /// Heap limit in bytes.
    pub memory_limit: Option<usize>,
    /// Stack limit in bytes.
    pub max_stack_size: Option<usize>,
    /// Allocation threshold in bytes that triggers a GC cycle.
    pub gc_threshold: Option<usize>,
    /// Root for file sources and relative imports. Defaults to the process working directory.
    pub cwd: Option<PathBuf>,
}

impl SandboxPolicy {
    /// The root directory file sources are read from.
    pub fn root(&self) -> PathBuf {
        self.cwd.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}
