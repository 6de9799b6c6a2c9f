use rquickjs::object::Property;
use rquickjs::{Ctx, Module, Object};

/// Expose the native `console` module as a global, routed to `tracing`.
pub fn setup(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    let console: Object = Module::import(ctx, "console")?.finish()?;
    ctx.globals()
        .prop("console", Property::from(console).writable().configurable())?;
    Ok(())
}
