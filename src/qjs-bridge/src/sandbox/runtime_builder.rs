use std::path::PathBuf;
use std::time::Duration;

use qjs_bridge_runtime::host::Host;
use qjs_bridge_runtime::{CancelSignal, QuickJs, SandboxPolicy};
use tracing::{Level, instrument};

use super::runtime::Runtime;
use crate::error::Result;
use crate::resolver::{FileSystem, ResolverHost};

/// Builds the module host once the resolution root is known.
type ModuleLoaderFactory = Box<dyn FnOnce(PathBuf) -> Box<dyn Host> + Send>;

/// A builder for a [`Runtime`].
///
/// The policy is fixed once [`RuntimeBuilder::build`] runs.
pub struct RuntimeBuilder {
    policy: SandboxPolicy,
    signal: Option<CancelSignal>,
    module_loader: Option<ModuleLoaderFactory>,
}

impl RuntimeBuilder {
    /// Create a builder with the default, permissive policy.
    pub fn new() -> Self {
        Self::from_policy(SandboxPolicy::default())
    }

    /// Start from an existing policy, e.g. one deserialized from a config file.
    pub fn from_policy(policy: SandboxPolicy) -> Self {
        Self {
            policy,
            signal: None,
            module_loader: None,
        }
    }

    /// Refuse every OS filesystem read: file sources and relative imports fail
    /// unless a module loader is installed with [`RuntimeBuilder::with_module_loader`].
    pub fn with_filesystem_disabled(mut self) -> Self {
        self.policy.disable_filesystem = true;
        self
    }

    /// Pin `Date` and `performance.now` to 2022-01-01T00:00:00Z.
    pub fn with_system_time_disabled(mut self) -> Self {
        self.policy.disable_system_time = true;
        self
    }

    /// Interrupt any evaluation that runs longer than `ceiling`.
    pub fn with_max_execution_time(mut self, ceiling: Duration) -> Self {
        self.policy.max_execution_time = Some(ceiling);
        self
    }

    /// Set the engine heap limit in bytes.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.policy.memory_limit = Some(bytes);
        self
    }

    /// Set the engine stack limit in bytes.
    pub fn with_max_stack_size(mut self, bytes: usize) -> Self {
        self.policy.max_stack_size = Some(bytes);
        self
    }

    /// Set the allocation threshold that triggers garbage collection.
    pub fn with_gc_threshold(mut self, bytes: usize) -> Self {
        self.policy.gc_threshold = Some(bytes);
        self
    }

    /// Resolve file sources and relative imports against `cwd`.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.policy.cwd = Some(cwd.into());
        self
    }

    /// Share `signal` with the runtime, e.g. one created with a deadline.
    pub fn with_cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Resolve and load modules and file sources from `file_system`.
    ///
    /// The loader is used even when the filesystem is disabled, so it should
    /// be an in-memory one such as [`EmbeddedModules`](crate::EmbeddedModules)
    /// in that case. Paths resolve from [`SandboxPolicy::cwd`], or `/` when unset.
    pub fn with_module_loader<Fs>(mut self, file_system: Fs) -> Self
    where
        Fs: FileSystem + Clone + Send + Sync + 'static,
    {
        self.module_loader = Some(Box::new(move |root| {
            Box::new(ResolverHost::new(file_system, root)) as Box<dyn Host>
        }));
        self
    }

    /// The policy the runtime will be built with.
    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Build the runtime.
    #[instrument(err(Debug), skip(self), level=Level::INFO)]
    pub fn build(self) -> Result<Runtime> {
        let signal = self.signal.unwrap_or_default();
        let host = match self.module_loader {
            Some(make_loader) => {
                let root = self
                    .policy
                    .cwd
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("/"));
                Some(make_loader(root))
            }
            None if self.policy.disable_filesystem => None,
            None => Some(Box::new(ResolverHost::os(self.policy.root())) as Box<dyn Host>),
        };
        let engine = match host {
            Some(host) => QuickJs::with_host(self.policy, signal.clone(), host)?,
            None => QuickJs::new(self.policy, signal.clone())?,
        };
        Ok(Runtime::from_engine(engine, signal))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("policy", &self.policy)
            .field("has_module_loader", &self.module_loader.is_some())
            .finish()
    }
}
