//! This crate embeds the QuickJS JavaScript engine behind a small,
//! cancellation-safe surface: load ES modules, evaluate scripts, and compile
//! to bytecode, under a construction-time sandbox policy.
#![deny(dead_code, missing_docs, unused_mut)]
#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::panic))]
#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::expect_used))]
#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::unwrap_used))]
#![cfg_attr(any(test, debug_assertions), allow(clippy::disallowed_macros))]

mod context;
mod error;
mod guard;
mod normalize;
mod options;
mod resolver;

/// Sandbox module containing the runtime, its builder and execution monitors.
pub mod sandbox;

/// The execution pipeline over any [`Engine`].
pub use context::Context;
/// Errors returned by the bridge.
pub use error::{Error, Result};
/// Typed option effects.
pub use options::EvalOption;
/// The engine call surface, the QuickJS engine and the values it produces.
pub use qjs_bridge_runtime::{
    Abort, CancelCause, CancelSignal, Engine, EngineValue, EvalKind, EvalOptions,
    FIXED_TIMESTAMP_MS, JsError, JsValue, QuickJs, SandboxPolicy, Source,
};
/// Module resolution and loading functionality.
pub use resolver::{EmbeddedModules, FileMetadata, FileSystem, ResolveError};
/// The monitor module, re-exporting `sleep` so custom monitors don't couple to tokio directly.
pub use sandbox::monitor;
/// Trait for implementing execution monitors that can cancel an evaluation.
pub use sandbox::monitor::ExecutionMonitor;
/// Sealed trait for monitor composition, derived for all `ExecutionMonitor`
/// impls and for tuples of up to 5 monitors.
pub use sandbox::monitor::MonitorSet;
/// Wall-clock based execution monitor.
#[cfg(feature = "monitor-wall-clock")]
pub use sandbox::monitor::WallClockMonitor;
/// A QuickJS runtime built with a sandbox policy.
pub use sandbox::runtime::Runtime;
/// A builder for creating a new `Runtime`.
pub use sandbox::runtime_builder::RuntimeBuilder;
