use rquickjs::{Ctx, Function, Value};

/// The instant every clock reads when system time is disabled:
/// 2022-01-01T00:00:00Z, in milliseconds since the Unix epoch.
pub const FIXED_TIMESTAMP_MS: f64 = 1_640_995_200_000.0;

// Replaces `Date` with a subclass whose argument-less constructor and `now()`
// read the fixed instant. Explicit dates (`new Date(2020, 0, 1)`) still work.
const INSTALL: &str = r#"
(function (now, fixed) {
    const RealDate = globalThis.Date;
    function Date(...args) {
        if (!new.target) {
            return new RealDate(fixed).toString();
        }
        const date = args.length === 0
            ? Reflect.construct(RealDate, [fixed], new.target)
            : Reflect.construct(RealDate, args, new.target);
        return date;
    }
    Object.setPrototypeOf(Date, RealDate);
    Date.prototype = RealDate.prototype;
    Object.defineProperty(RealDate.prototype, "constructor", {
        value: Date,
        writable: true,
        configurable: true,
    });
    // `now` is inherited read-only from RealDate, so plain assignment throws
    Object.defineProperty(Date, "now", { value: now, writable: true, configurable: true });
    globalThis.Date = Date;
    if (typeof globalThis.performance === "object" && globalThis.performance !== null) {
        Object.defineProperty(globalThis.performance, "now", {
            value: () => 0,
            writable: true,
            configurable: true,
        });
    }
})
"#;

/// Pin `Date` and `performance.now` to [`FIXED_TIMESTAMP_MS`].
pub fn setup(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    let now = Function::new(ctx.clone(), || FIXED_TIMESTAMP_MS)?.with_name("now")?;
    let install: Function = ctx.eval(INSTALL)?;
    install.call::<_, Value>((now, FIXED_TIMESTAMP_MS))?;
    tracing::debug!(timestamp = FIXED_TIMESTAMP_MS, "system time disabled");
    Ok(())
}
