//! Hook key composition and class detection.
//!
//! A hook key is `module_id + ':' + hook_fn_name`. The hook-function-name
//! prefix decides which of the three dispatch classes the hook belongs to.

/// Prefix of cli hook functions.
pub const CLI_PREFIX: &str = "cli__";

/// Prefix of synchronous app hook functions.
pub const APP_PREFIX: &str = "app__";

/// Prefix of asynchronous app hook functions.
pub const APP_ASYNC_PREFIX: &str = "app_async__";

/// Split character between module id and hook function name.
pub const MODULE_SPLIT: char = ':';

/// Dispatch class of a hook, derived from its function-name prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookClass {
    /// Invoked during CLI command setup, sequentially.
    Cli,
    /// Invoked synchronously during application phases, sequentially.
    App,
    /// Invoked concurrently during asynchronous application phases.
    AppAsync,
}

impl HookClass {
    /// Classify a hook function name by its prefix.
    ///
    /// Returns `None` for names without a recognized prefix; such
    /// properties are inert to the registry.
    pub fn of(fn_name: &str) -> Option<HookClass> {
        if fn_name.starts_with(APP_ASYNC_PREFIX) {
            Some(HookClass::AppAsync)
        } else if fn_name.starts_with(APP_PREFIX) {
            Some(HookClass::App)
        } else if fn_name.starts_with(CLI_PREFIX) {
            Some(HookClass::Cli)
        } else {
            None
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            HookClass::Cli => CLI_PREFIX,
            HookClass::App => APP_PREFIX,
            HookClass::AppAsync => APP_ASYNC_PREFIX,
        }
    }

    /// Full hook function name for a short hook name in this class,
    /// e.g. `App.fn_name("db_load")` is `app__db_load`.
    pub fn fn_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix(), name)
    }
}

impl std::fmt::Display for HookClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookClass::Cli => write!(f, "cli"),
            HookClass::App => write!(f, "app"),
            HookClass::AppAsync => write!(f, "app-async"),
        }
    }
}

/// A bound hook key: the unique handle for one hook of one module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookKey {
    pub module_id: String,
    pub fn_name: String,
    pub class: HookClass,
}

impl HookKey {
    /// The composite storage key, `module_id:fn_name`.
    pub fn storage_key(&self) -> String {
        compose(&self.module_id, &self.fn_name)
    }
}

impl std::fmt::Display for HookKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.module_id, MODULE_SPLIT, self.fn_name)
    }
}

/// Compose a storage key from a module id and hook function name.
pub fn compose(module_id: &str, fn_name: &str) -> String {
    format!("{}{}{}", module_id, MODULE_SPLIT, fn_name)
}

/// Split a storage key into `(module_id, fn_name)`.
pub fn split(key: &str) -> Option<(&str, &str)> {
    key.split_once(MODULE_SPLIT)
}
