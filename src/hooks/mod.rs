//! Hook binding and lookup.
//!
//! Modules expose hook functions named with one of three prefixes:
//!
//! - `cli__` — invoked sequentially during CLI command setup
//! - `app__` — invoked sequentially during synchronous application phases
//! - `app_async__` — invoked concurrently during asynchronous phases
//!
//! Each bound hook is identified by its key, `module_id:fn_name`. Keys are
//! dispatched in registration order; dispatch itself lives on the module
//! manager, which owns the enabled-module table the registry's keys are
//! resolved against.

mod error;
mod key;
mod registry;

pub use error::HookError;
pub use key::{
    APP_ASYNC_PREFIX, APP_PREFIX, CLI_PREFIX, HookClass, HookKey, MODULE_SPLIT, compose, split,
};
pub use registry::HookRegistry;
