//! Module resolution and loading.
//!
//! Relative `import` specifiers and file sources are resolved with
//! `oxc_resolver` over a pluggable [`FileSystem`]: the OS filesystem, or a
//! fixed set of [`EmbeddedModules`] built with [`embed_modules!`](crate::embed_modules).

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use oxc_resolver::{ResolveOptions, ResolverGeneric};
pub use oxc_resolver::{FileMetadata, FileSystem, FileSystemOs, ResolveError};
use phf::{Map, phf_map};
use qjs_bridge_runtime::host::Host;

static NO_MODULES: Map<&'static str, &'static str> = phf_map! {};

/// Module sources compiled into the binary, served as a read-only tree.
///
/// Keys are `/`-separated paths relative to the resolution root; a key's
/// parent segments show up as directories. Nothing touches the disk, so this
/// is the loader to pair with a disabled filesystem.
#[derive(Clone, Copy)]
pub struct EmbeddedModules {
    sources: &'static Map<&'static str, &'static str>,
}

enum Entry {
    Module(&'static str),
    Directory,
}

impl EmbeddedModules {
    /// Wraps a static map of module sources.
    pub const fn new(sources: &'static Map<&'static str, &'static str>) -> Self {
        Self { sources }
    }

    fn entry(&self, path: &Path) -> io::Result<Entry> {
        let key = module_key(path)?;
        if let Some(source) = self.sources.get(key.as_str()) {
            return Ok(Entry::Module(source));
        }
        let is_dir = if key.is_empty() {
            !self.sources.is_empty()
        } else {
            self.sources
                .keys()
                .any(|k| k.strip_prefix(key.as_str()).is_some_and(|rest| rest.starts_with('/')))
        };
        if is_dir {
            Ok(Entry::Directory)
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no embedded module at '{key}'"),
            ))
        }
    }
}

/// Flatten `path` into a map key: separators unified, `.` dropped, `..` applied.
fn module_key(path: &Path) -> io::Result<String> {
    let raw = path
        .to_str()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "module path is not UTF-8"))?;
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

impl FileSystem for EmbeddedModules {
    fn new() -> Self {
        Self::new(&NO_MODULES)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.read_to_string(path).map(String::into_bytes)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        match self.entry(path)? {
            Entry::Module(source) => Ok(source.to_owned()),
            Entry::Directory => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' is a directory", path.display()),
            )),
        }
    }

    fn metadata(&self, path: &Path) -> io::Result<FileMetadata> {
        let is_file = matches!(self.entry(path)?, Entry::Module(_));
        Ok(FileMetadata::new(is_file, !is_file, false))
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<FileMetadata> {
        self.metadata(path)
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf, ResolveError> {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' is not a link", path.display()),
        )
        .into())
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(PathBuf::from("/").join(module_key(path)?))
    }
}

/// Build [`EmbeddedModules`] from `"key" => "file"` pairs read with
/// `include_str!` (relative to the invoking file), or from
/// `"key" => @inline "source"` pairs.
///
/// ```no_run
/// use qjs_bridge::{RuntimeBuilder, embed_modules};
///
/// let modules = embed_modules! {
///     "math.js" => @inline "export const add = (a, b) => a + b;",
/// };
/// let runtime = RuntimeBuilder::new()
///     .with_filesystem_disabled()
///     .with_module_loader(modules)
///     .build()
///     .unwrap();
/// ```
#[macro_export]
macro_rules! embed_modules {
    (@sources $($key:literal => $source:expr),*) => {{
        static SOURCES: ::phf::Map<&'static str, &'static str> = ::phf::phf_map! {
            $($key => $source,)*
        };
        $crate::EmbeddedModules::new(&SOURCES)
    }};
    ($($key:literal => @inline $source:expr),* $(,)?) => {
        $crate::embed_modules!(@sources $($key => $source),*)
    };
    ($($key:literal => $file:literal),* $(,)?) => {
        $crate::embed_modules!(@sources $($key => include_str!($file)),*)
    };
}

/// A module [`Host`] backed by `oxc_resolver` over `Fs`.
pub(crate) struct ResolverHost<Fs: FileSystem> {
    resolver: ResolverGeneric<Fs>,
    file_system: Fs,
    root: PathBuf,
}

impl<Fs: FileSystem + Clone + 'static> ResolverHost<Fs> {
    /// Resolve against `file_system`, with `root` standing in for the `"."` base.
    pub(crate) fn new(file_system: Fs, root: PathBuf) -> Self {
        let resolver = ResolverGeneric::new_with_file_system(
            file_system.clone(),
            ResolveOptions {
                extensions: vec![".js".into(), ".mjs".into()],
                condition_names: vec!["import".into(), "module".into()],
                ..Default::default()
            },
        );
        Self {
            resolver,
            file_system,
            root,
        }
    }
}

impl ResolverHost<FileSystemOs> {
    /// Resolve against the OS filesystem under `root`.
    pub(crate) fn os(root: PathBuf) -> Self {
        let root = std::path::absolute(&root).unwrap_or(root);
        Self::new(<FileSystemOs as FileSystem>::new(), root)
    }
}

impl<Fs: FileSystem + Send + Sync + 'static> Host for ResolverHost<Fs> {
    fn resolve_module(&self, base: &str, name: &str) -> anyhow::Result<String> {
        let base = if base == "." {
            self.root.clone()
        } else {
            PathBuf::from(base)
        };
        tracing::debug!(base = %base.display(), specifier = %name, "Resolving module");

        let resolved = self.resolver.resolve(&base, name).map_err(|e| {
            anyhow!(
                "Failed to resolve module '{}' from '{}': {:?}",
                name,
                base.display(),
                e
            )
        })?;
        Ok(resolved.path().to_string_lossy().to_string())
    }

    fn load_module(&self, path: &str) -> anyhow::Result<String> {
        tracing::debug!(path = %path, "Loading module");
        self.file_system
            .read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read module '{path}'"))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_file_read() {
        let fs = embed_modules! {
            "test.js" => @inline "console.log('hello');",
        };

        let content = fs.read_to_string(Path::new("test.js")).unwrap();
        assert_eq!(content, "console.log('hello');");
    }

    #[test]
    fn test_directory_detection() {
        let fs = embed_modules! {
            "foo/bar.js" => @inline "content",
        };

        let metadata = fs.metadata(Path::new("foo")).unwrap();
        assert!(metadata.is_dir());
        assert!(!metadata.is_file());
    }

    #[test]
    fn test_file_metadata() {
        let fs = embed_modules! {
            "test.js" => @inline "content",
        };

        let metadata = fs.metadata(Path::new("test.js")).unwrap();
        assert!(metadata.is_file());
        assert!(!metadata.is_dir());
    }

    #[test]
    fn test_prefix_collision() {
        let fs = embed_modules! {
            "foo.js" => @inline "content1",
            "foobar.js" => @inline "content2",
        };

        assert!(fs.metadata(Path::new("foo")).is_err());
        assert!(fs.metadata(Path::new("foo.js")).unwrap().is_file());
    }

    #[test]
    fn test_resolver_host_over_embedded_modules() {
        let fs = embed_modules! {
            "lib/math.js" => @inline "export const one = 1;",
        };
        let host = ResolverHost::new(fs, PathBuf::from("/"));

        let path = host.resolve_module(".", "./lib/math.js").unwrap();
        assert_eq!(host.load_module(&path).unwrap(), "export const one = 1;");

        // extension is optional
        let path = host.resolve_module("/lib", "./math").unwrap();
        assert!(path.ends_with("math.js"), "{path}");

        assert!(host.resolve_module(".", "./missing.js").is_err());
    }

    #[test]
    fn test_resolver_host_over_os_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("util.js"), "export default 7;").unwrap();
        let host = ResolverHost::os(dir.path().to_path_buf());

        let path = host.resolve_module(".", "./util.js").unwrap();
        assert_eq!(host.load_module(&path).unwrap(), "export default 7;");
    }

    #[test]
    fn test_not_found() {
        let fs = embed_modules! {
            "exists.js" => @inline "content",
        };

        let result = fs.read_to_string(Path::new("missing.js"));
        assert!(result.is_err());
    }

    #[test]
    fn test_paths_are_normalized_before_lookup() {
        let fs = embed_modules! {
            "lib/math.js" => @inline "math",
        };

        for path in ["/lib/math.js", "./lib/./math.js", "lib/util/../math.js", "lib\\math.js"] {
            assert_eq!(fs.read_to_string(Path::new(path)).unwrap(), "math", "{path}");
        }
        assert_eq!(
            fs.canonicalize(Path::new("./lib/../lib/math.js")).unwrap(),
            PathBuf::from("/lib/math.js")
        );
    }

    #[test]
    fn test_directories_are_not_readable() {
        let fs = embed_modules! {
            "lib/math.js" => @inline "math",
        };

        assert!(fs.metadata(Path::new("/")).unwrap().is_dir());
        let err = fs.read_to_string(Path::new("lib")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert!(fs.read_link(Path::new("lib/math.js")).is_err());
    }

    #[test]
    fn test_default_embedded_modules_are_empty() {
        let fs = <EmbeddedModules as FileSystem>::new();
        assert!(fs.metadata(Path::new("/")).is_err());
        assert!(fs.read_to_string(Path::new("any.js")).is_err());
    }
}
