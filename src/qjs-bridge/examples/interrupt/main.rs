//! Interrupt Example: cancelling a runaway evaluation from another thread
//!
//! This example shows how to:
//! 1. Cancel a long-running evaluation through the runtime's cancel signal
//! 2. Check the `poisoned()` state after interruption
//! 3. Bound evaluations with a `WallClockMonitor` or a policy ceiling instead
//!
//! Run with: cargo run --example interrupt

#![allow(clippy::disallowed_macros)]

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use qjs_bridge::{CancelCause, Error, EvalOption, Runtime, SandboxPolicy, WallClockMonitor};

const SLOW_SCRIPT: &str = r#"
    const start = Date.now();
    let now = start;
    while (now - start < 4000) {
        now = Date.now();
    }
    "completed"
"#;

fn main() -> Result<()> {
    println!("Interrupt Example: cancelling runaway scripts\n");

    let mut runtime = Runtime::new(SandboxPolicy::default())?;
    println!("Initial poisoned state: {}", runtime.poisoned());

    let signal = runtime.signal().clone();

    // Use a barrier so the cancel thread starts timing once the script is about to run
    let barrier1 = Arc::new(Barrier::new(2));
    let barrier2 = barrier1.clone();

    let cancel_thread = thread::spawn(move || {
        barrier1.wait();
        println!("Cancel thread: waiting 1 second before cancelling...");
        thread::sleep(Duration::from_secs(1));
        signal.cancel();
        println!("Cancel thread: signal fired");
    });

    barrier2.wait();
    println!("Main thread: starting 4-second busy loop...");
    let result = runtime.eval("slow.js", [EvalOption::code(SLOW_SCRIPT)]);
    cancel_thread
        .join()
        .map_err(|_| anyhow::anyhow!("cancel thread panicked"))?;

    match result {
        Ok(value) => println!("Unexpected: script completed with {value:?}"),
        Err(Error::Interrupted(cause)) => {
            println!("\nScript was interrupted: {cause}");
            println!("Poisoned after interrupt: {}", runtime.poisoned());
        }
        Err(e) => return Err(e.into()),
    }

    // A poisoned runtime is discarded; a fresh one is cheap to build.
    println!("\nBounding a script with a wall-clock monitor...");
    let mut runtime = Runtime::new(SandboxPolicy::default())?;
    let monitor = WallClockMonitor::new(Duration::from_millis(500))?;
    match runtime.eval_with_monitor("slow.js", [EvalOption::code(SLOW_SCRIPT)], &monitor) {
        Err(Error::Interrupted(CancelCause::DeadlineExceeded)) => {
            println!("Monitor fired after 500ms, poisoned: {}", runtime.poisoned());
        }
        other => println!("Unexpected: {other:?}"),
    }

    println!("\nBounding a script with a policy ceiling...");
    let mut runtime = Runtime::builder()
        .with_max_execution_time(Duration::from_millis(250))
        .build()?;
    let fast = runtime.eval("fast.js", [EvalOption::code("'still fast'")])?;
    println!("Fast script: {fast:?}");
    match runtime.eval("slow.js", [EvalOption::code(SLOW_SCRIPT)]) {
        Err(e) => println!("Slow script: {e}"),
        Ok(value) => println!("Unexpected: {value:?}"),
    }

    println!("\nHow it works:");
    println!("   - QuickJS polls the cancel signal from its interrupt handler");
    println!("   - The interrupted engine is torn down and the runtime is poisoned");
    println!("   - Monitors and ceilings cancel with `DeadlineExceeded`");

    Ok(())
}
