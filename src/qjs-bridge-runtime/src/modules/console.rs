use rquickjs::Coerced;
use rquickjs::prelude::Rest;

/// Join console arguments the way `console.log` prints them.
fn join(args: Rest<Coerced<String>>) -> String {
    args.into_inner()
        .into_iter()
        .map(|arg| arg.0)
        .collect::<Vec<_>>()
        .join(" ")
}

#[rquickjs::module(rename_vars = "camelCase", rename_types = "camelCase")]
#[allow(clippy::module_inception)]
pub mod console {
    use super::*;

    #[rquickjs::function]
    pub fn log(args: Rest<Coerced<String>>) -> rquickjs::Result<()> {
        tracing::info!(target: "qjs_bridge_runtime::console", "{}", join(args));
        Ok(())
    }

    #[rquickjs::function]
    pub fn info(args: Rest<Coerced<String>>) -> rquickjs::Result<()> {
        tracing::info!(target: "qjs_bridge_runtime::console", "{}", join(args));
        Ok(())
    }

    #[rquickjs::function]
    pub fn debug(args: Rest<Coerced<String>>) -> rquickjs::Result<()> {
        tracing::debug!(target: "qjs_bridge_runtime::console", "{}", join(args));
        Ok(())
    }

    #[rquickjs::function]
    pub fn warn(args: Rest<Coerced<String>>) -> rquickjs::Result<()> {
        tracing::warn!(target: "qjs_bridge_runtime::console", "{}", join(args));
        Ok(())
    }

    #[rquickjs::function]
    pub fn error(args: Rest<Coerced<String>>) -> rquickjs::Result<()> {
        tracing::error!(target: "qjs_bridge_runtime::console", "{}", join(args));
        Ok(())
    }
}
