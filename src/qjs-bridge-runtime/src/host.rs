use anyhow::Result;

/// Module resolution and loading supplied by the embedder.
///
/// The engine calls into the host for `import` specifiers that are not native
/// modules and for file sources. Paths returned by [`Host::resolve_module`] are
/// passed back verbatim to [`Host::load_module`] and used as module names, so
/// relative imports inside a loaded module resolve against its directory.
pub trait Host: Send + Sync {
    /// Resolve `name` relative to the directory `base`. A `base` of `"."`
    /// denotes the host's root directory.
    fn resolve_module(&self, base: &str, name: &str) -> Result<String>;

    /// Read the source of a module previously resolved by [`Host::resolve_module`].
    fn load_module(&self, path: &str) -> Result<String>;
}

impl<H: Host + ?Sized> Host for Box<H> {
    fn resolve_module(&self, base: &str, name: &str) -> Result<String> {
        (**self).resolve_module(base, name)
    }

    fn load_module(&self, path: &str) -> Result<String> {
        (**self).load_module(path)
    }
}
