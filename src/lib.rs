//! # modhost
//!
//! An extensible module host: third-party modules register units of
//! behavior under hook names, and the host dispatches them at well-defined
//! extension points (CLI command registration, pre/post data-load phases,
//! async export phases).
//!
//! The crate covers module lifecycle and invocation orchestration:
//! discovering modules, resolving a user-supplied specifier to a canonical
//! package, installing/removing it through an external package manager,
//! persisting enabled/disabled state, binding the hook functions a module
//! exports, and dispatching hooks to enabled modules in a deterministic,
//! fault-isolated order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modhost::Host;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), modhost::Error> {
//!     let host = Host::new()?;
//!     host.load_cli_commands()?;
//!     host.run_app_phase("db_load", vec!["testa".into(), "testb".into()])?;
//!     host.run_async_phase("data_export").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! A module is a [`ModuleDescriptor`] built from metadata, optional
//! `install`/`uninstall`/`config` lifecycle callables, and hook functions
//! named with one of the recognized prefixes:
//!
//! ```rust
//! use modhost::ModuleDescriptor;
//!
//! let module = ModuleDescriptor::builder("greeter")
//!     .name("Greeter")
//!     .version("0.1.0")
//!     .sync_hook("app__db_load", |ctx| {
//!         ctx.push_output("hello".into());
//!         Ok(())
//!     })
//!     .build();
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod context;
pub mod events;
pub mod hooks;
pub mod host;
pub mod modules;

// Re-exports for convenience
pub use config::{ConfigError, ConfigStore, DENY_LIST};
pub use context::{CliCommand, CliOption, HostContext};
pub use events::{HostEvent, ModuleOp};
pub use hooks::{HookClass, HookError, HookKey, HookRegistry, MODULE_SPLIT};
pub use host::{Host, HostBuilder};
pub use modules::{
    DiskVfs, HookCallable, MODULE_PREFIX, ModuleAction, ModuleDescriptor, ModuleError,
    ModuleFactory, ModuleManager, ModuleResult, NameResolver, NpmRunner, PackageMetadata,
    PackageRunner, PmError, PmOptions, PmOutput, ResolvedName, ResultBody, Vfs,
};

/// Error type for modhost operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Hook binding failed (duplicate key, callable/class mismatch).
    #[error(transparent)]
    Hook(#[from] hooks::HookError),

    /// Module loading or metadata handling failed.
    #[error(transparent)]
    Module(#[from] modules::ModuleError),

    /// Config store operation failed.
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// Package-manager invocation failed.
    #[error(transparent)]
    Pm(#[from] modules::PmError),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A module hook or lifecycle callable reported a failure.
    #[error("Module runtime error: {0}")]
    Runtime(String),
}

impl Error {
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(message.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let hook_err = hooks::HookError::DuplicateKey {
            key: "m:app__x".into(),
        };
        let err: Error = hook_err.into();
        assert!(matches!(err, Error::Hook(_)));
        assert!(err.to_string().contains("m:app__x"));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_runtime_error() {
        let err = Error::runtime("hook exploded");
        assert_eq!(err.to_string(), "Module runtime error: hook exploded");
    }
}
