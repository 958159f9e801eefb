//! Module lifecycle: descriptors, name resolution, discovery, and
//! install/uninstall orchestration against the external package manager.
//!
//! A module is a descriptor (metadata, lifecycle callables, hook
//! functions) registered under a stable id. Community modules are
//! distributed as packages whose names embed the `mh-module-` marker and
//! are installed under `node_modules/` at the host base directory; their
//! descriptors load through an explicit factory registry keyed by package
//! name.

pub mod builtin;
mod descriptor;
mod error;
mod manager;
mod metadata;
mod pm;
mod resolver;

pub use descriptor::{AsyncHookFn, HookCallable, ModuleDescriptor, SyncHookFn};
pub use error::ModuleError;
pub use manager::{
    MODULE_INSTALL_DIR, ModuleAction, ModuleFactory, ModuleManager, ModuleResult, ResultBody,
};
pub use metadata::{METADATA_FILE, PackageMetadata};
pub use pm::{DEFAULT_PROGRAM, NpmRunner, PackageRunner, PmError, PmOptions, PmOutput};
pub use resolver::{DiskVfs, MODULE_PREFIX, NameResolver, ResolvedName, Vfs};
