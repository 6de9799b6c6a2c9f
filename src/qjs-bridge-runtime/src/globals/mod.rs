use rquickjs::Ctx;

use crate::policy::SandboxPolicy;

pub mod clock;
mod console;

pub fn setup(ctx: &Ctx<'_>, policy: &SandboxPolicy) -> rquickjs::Result<()> {
    console::setup(ctx)?;
    if policy.disable_system_time {
        clock::setup(ctx)?;
    }
    Ok(())
}
