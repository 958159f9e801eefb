//! Module name resolution.
//!
//! Converts a user-typed module reference into a canonical identity and an
//! installable target. Accepted shapes:
//!
//! 1. `mh-module-xxx` — used verbatim
//! 2. `@scope/mh-module-xxx` — used verbatim
//! 3. `xxx` — prefixed to `mh-module-xxx`
//! 4. `./dir/mh-module-xxx` or `/abs/dir/mh-module-xxx` — resolved to a
//!    normalized absolute path; identity comes from the module's own
//!    package metadata
//!
//! A `@<version>` suffix is stripped for identity comparison. Resolution
//! never touches the module registry; failures surface as warnings and a
//! `success: false` result so batch callers can filter them out.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::metadata::PackageMetadata;

/// Canonical module-name prefix. Community module package names must embed
/// this marker.
pub const MODULE_PREFIX: &str = "mh-module-";

static SCOPED_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@[^/]+/mh-module-").expect("valid regex"));
static NORMAL_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(mh-module-[0-9A-Za-z_-]+)(?:@.+)?$").expect("valid regex"));
static SCOPED_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(@[^/]+/mh-module-[0-9A-Za-z_-]+)(?:@.+)?$").expect("valid regex")
});

/// Result of resolving a user-supplied module reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedName {
    pub success: bool,
    /// Stable identity used as a module id once installed.
    pub canonical_name: String,
    /// Resolvable install target: a package name or an absolute path.
    pub full_name: String,
}

impl ResolvedName {
    fn failure() -> Self {
        Self {
            success: false,
            canonical_name: String::new(),
            full_name: String::new(),
        }
    }
}

/// Filesystem capability used during resolution, injected so the resolver
/// is testable without real disk state.
pub trait Vfs: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn read_package(&self, dir: &Path) -> Option<PackageMetadata>;
}

/// Real-disk [`Vfs`].
pub struct DiskVfs;

impl Vfs for DiskVfs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_package(&self, dir: &Path) -> Option<PackageMetadata> {
        PackageMetadata::load(dir).ok()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NameShape {
    Scoped,
    Normal,
    Simple,
    Path,
}

pub struct NameResolver {
    vfs: Arc<dyn Vfs>,
    cwd: PathBuf,
}

impl NameResolver {
    pub fn new() -> Self {
        Self {
            vfs: Arc::new(DiskVfs),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn with_vfs(vfs: Arc<dyn Vfs>, cwd: PathBuf) -> Self {
        Self { vfs, cwd }
    }

    /// Resolve a module name or path.
    pub fn resolve(&self, input: &str) -> ResolvedName {
        let shape = self.classify(input);
        let Some(full_name) = self.full_name(shape, input) else {
            return ResolvedName::failure();
        };
        let Some(canonical_name) = self.canonical_name(shape, &full_name) else {
            return ResolvedName::failure();
        };
        ResolvedName {
            success: true,
            canonical_name,
            full_name,
        }
    }

    fn classify(&self, input: &str) -> NameShape {
        if SCOPED_SHAPE.is_match(input) {
            NameShape::Scoped
        } else if input.starts_with(MODULE_PREFIX) {
            NameShape::Normal
        } else if !input.contains('/')
            && !input.contains('\\')
            && !self.vfs.exists(&self.cwd.join(input))
        {
            NameShape::Simple
        } else {
            NameShape::Path
        }
    }

    fn full_name(&self, shape: NameShape, input: &str) -> Option<String> {
        match shape {
            NameShape::Scoped | NameShape::Normal => Some(input.to_string()),
            NameShape::Simple => Some(format!("{}{}", MODULE_PREFIX, input)),
            NameShape::Path => {
                let path = Path::new(input);
                let absolute = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.cwd.join(path)
                };
                if self.vfs.exists(&absolute) {
                    Some(normalize_separators(&absolute))
                } else {
                    tracing::warn!(module = input, "cannot find module");
                    None
                }
            }
        }
    }

    fn canonical_name(&self, shape: NameShape, full_name: &str) -> Option<String> {
        match shape {
            NameShape::Scoped => Some(strip_version(full_name, &SCOPED_VERSION)),
            NameShape::Normal | NameShape::Simple => {
                Some(strip_version(full_name, &NORMAL_VERSION))
            }
            NameShape::Path => {
                let Some(meta) = self.vfs.read_package(Path::new(full_name)) else {
                    tracing::warn!(module = full_name, "cannot find module metadata");
                    return None;
                };
                if meta.name.contains(MODULE_PREFIX) {
                    Some(meta.name)
                } else {
                    tracing::warn!(
                        module = full_name,
                        name = %meta.name,
                        "module metadata name must include the prefix {}",
                        MODULE_PREFIX
                    );
                    None
                }
            }
        }
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip a trailing `@<version>` from a module name.
///
/// A name that does not match the expected pattern is returned untouched
/// with a warning; partial matches are never propagated.
fn strip_version(name: &str, pattern: &Regex) -> String {
    match pattern.captures(name) {
        Some(captures) => captures[1].to_string(),
        None => {
            tracing::warn!(module = name, "cannot remove module version");
            name.to_string()
        }
    }
}

fn normalize_separators(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
