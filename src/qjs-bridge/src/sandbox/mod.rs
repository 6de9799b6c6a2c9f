//! The `sandbox` module contains the QuickJS-backed runtime and its policy plumbing.
/// Metric definitions for Sandbox module.
pub(crate) mod metrics;
/// Execution monitoring and enforcement.
pub mod monitor;
/// A QuickJS runtime built with a sandbox policy.
pub(crate) mod runtime;
/// A builder for creating a new `Runtime`.
pub(crate) mod runtime_builder;
