//! Execution monitor tests.
#![cfg(feature = "monitor-wall-clock")]
#![allow(clippy::disallowed_macros)]

use std::future::Future;
use std::time::Duration;

use qjs_bridge::{
    CancelCause, EngineValue, Error, EvalOption, ExecutionMonitor, Runtime, SandboxPolicy,
    WallClockMonitor,
};

/// A monitor that never fires.
struct Idle;

impl ExecutionMonitor for Idle {
    fn get_monitor(&self) -> anyhow::Result<impl Future<Output = ()> + Send + 'static> {
        Ok(std::future::pending())
    }

    fn name(&self) -> &'static str {
        "idle"
    }
}

/// A monitor that cannot start.
struct Broken;

impl ExecutionMonitor for Broken {
    fn get_monitor(&self) -> anyhow::Result<impl Future<Output = ()> + Send + 'static> {
        anyhow::bail!("no clock available");
        #[allow(unreachable_code)]
        Ok(std::future::ready(()))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

#[test]
fn fast_script_completes_under_a_monitor() {
    let mut runtime = Runtime::new(SandboxPolicy::default()).unwrap();
    let monitor = WallClockMonitor::new(Duration::from_secs(5)).unwrap();

    let value = runtime
        .eval_with_monitor("main.js", [EvalOption::code("[1, 2, 3].length")], &monitor)
        .unwrap();
    assert_eq!(value.as_i64(), 3);
    assert!(!runtime.poisoned());

    // the aborted monitor task does not cancel later evaluations
    std::thread::sleep(Duration::from_millis(20));
    assert!(runtime.eval("main.js", [EvalOption::code("1")]).is_ok());
}

#[test]
fn wall_clock_monitor_interrupts_a_long_script() {
    let mut runtime = Runtime::new(SandboxPolicy::default()).unwrap();
    let monitor = WallClockMonitor::new(Duration::from_millis(100)).unwrap();

    let err = runtime
        .eval_with_monitor("spin.js", [EvalOption::code("while (true) {}")], &monitor)
        .unwrap_err();
    assert_eq!(err.cancel_cause(), Some(CancelCause::DeadlineExceeded));
    assert!(runtime.poisoned());
}

#[test]
fn tuple_monitor_fires_on_the_first_member() {
    let mut runtime = Runtime::new(SandboxPolicy::default()).unwrap();
    let monitors = (
        Idle,
        WallClockMonitor::new(Duration::from_millis(100)).unwrap(),
    );

    let err = runtime
        .eval_with_monitor("spin.js", [EvalOption::code("for (;;) {}")], &monitors)
        .unwrap_err();
    assert!(matches!(err, Error::Interrupted(CancelCause::DeadlineExceeded)));
}

#[test]
fn failing_monitor_runs_nothing() {
    let mut runtime = Runtime::new(SandboxPolicy::default()).unwrap();
    let monitors = (WallClockMonitor::new(Duration::from_secs(5)).unwrap(), Broken);

    let err = runtime
        .eval_with_monitor(
            "main.js",
            [EvalOption::code("globalThis.ran = true")],
            &monitors,
        )
        .unwrap_err();
    assert!(matches!(&err, Error::Monitor(msg) if msg.contains("no clock available")));
    assert!(!runtime.poisoned());

    let ran = runtime
        .eval("check.js", [EvalOption::code("typeof globalThis.ran")])
        .unwrap();
    assert_eq!(ran.as_string(), "undefined");
}

#[test]
fn zero_timeout_is_rejected() {
    assert!(WallClockMonitor::new(Duration::ZERO).is_err());
}
