#![allow(clippy::disallowed_macros)]
use std::env;
use std::thread::spawn;

use anyhow::Result;
use qjs_bridge::{EvalOption, Runtime, RuntimeBuilder, embed_modules};
use tracing::{Level, span};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

const WORKERS: usize = 4;

fn main() -> Result<()> {
    let filter = env::args()
        .nth(1)
        .unwrap_or_else(|| "info,qjs_bridge=trace,qjs_bridge_runtime=debug".to_string());
    let env_filter = EnvFilter::builder().parse(filter)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::FULL)
        .init();

    run_example()
}

fn runtime() -> Result<Runtime> {
    let fs = embed_modules! {
        "math.js" => @inline "export const add = (a, b) => a + b;",
    };
    Ok(RuntimeBuilder::new()
        .with_filesystem_disabled()
        .with_system_time_disabled()
        .with_module_loader(fs)
        .build()?)
}

fn run_example() -> Result<()> {
    // create a top-level span for this example
    let span = span!(Level::INFO, "example");
    let _entered = span.enter();

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            spawn(move || -> Result<()> {
                let span = span!(Level::INFO, "worker", worker);
                let _entered = span.enter();

                let mut runtime = runtime()?;
                let namespace = runtime.load(
                    "main.js",
                    [EvalOption::code(format!(
                        "import {{ add }} from './math.js';\n\
                         console.log('worker {worker} at', new Date().toISOString());\n\
                         export const sum = add({worker}, 10);"
                    ))],
                )?;
                tracing::info!(?namespace, "module loaded");

                let bytecode = runtime.compile(
                    "lib.js",
                    [EvalOption::code("export const squared = 7 * 7;")],
                )?;
                tracing::info!(len = bytecode.len(), "module compiled");

                // thrown exceptions are logged at the span boundary
                if let Err(e) = runtime.eval("bad.js", [EvalOption::code("missing()")]) {
                    tracing::warn!(error = %e, "script failed");
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("worker thread panicked"))??;
    }
    Ok(())
}
