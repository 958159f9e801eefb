//! Shared execution context threaded through hook invocations.

use std::sync::{Arc, Mutex, OnceLock, Weak};

use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::ConfigStore;
use crate::events::HostEvent;
use crate::modules::ModuleManager;

/// An option declaration a cli hook registers for the external
/// argument-parsing front end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CliOption {
    /// Flag spelling, e.g. `-p, --proxy <proxy>`.
    pub flags: String,
    pub description: String,
}

impl CliOption {
    pub fn new(flags: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            flags: flags.into(),
            description: description.into(),
        }
    }
}

/// A subcommand declaration a cli hook registers for the external
/// argument-parsing front end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CliCommand {
    pub name: String,
    pub alias: Option<String>,
    pub description: String,
    /// Positional argument specs, e.g. `<action>`, `<modules...>`.
    pub arguments: Vec<String>,
    pub options: Vec<CliOption>,
}

/// The value threaded through every hook invocation of a dispatch.
///
/// Created once per host process and shared by reference. The `input` and
/// `output` sequences follow an append-only convention: hooks are trusted
/// to push rather than replace.
pub struct HostContext {
    input: Mutex<Vec<Value>>,
    output: Mutex<Vec<Value>>,
    config: Arc<ConfigStore>,
    events: broadcast::Sender<HostEvent>,
    manager: OnceLock<Weak<ModuleManager>>,
    commands: Mutex<Vec<CliCommand>>,
    root_options: Mutex<Vec<CliOption>>,
    version: Mutex<Option<String>>,
}

impl HostContext {
    pub(crate) fn new(config: Arc<ConfigStore>, events: broadcast::Sender<HostEvent>) -> Self {
        Self {
            input: Mutex::new(Vec::new()),
            output: Mutex::new(Vec::new()),
            config,
            events,
            manager: OnceLock::new(),
            commands: Mutex::new(Vec::new()),
            root_options: Mutex::new(Vec::new()),
            version: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Convenience passthrough to the config store.
    pub fn get_config(&self, key: &str) -> Option<Value> {
        self.config.get(key)
    }

    pub fn emit(&self, event: HostEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }

    /// The module manager, once the host has attached it.
    pub fn manager(&self) -> Option<Arc<ModuleManager>> {
        self.manager.get().and_then(Weak::upgrade)
    }

    pub(crate) fn attach_manager(&self, manager: &Arc<ModuleManager>) {
        let _ = self.manager.set(Arc::downgrade(manager));
    }

    pub fn set_input(&self, values: Vec<Value>) {
        if let Ok(mut input) = self.input.lock() {
            *input = values;
        }
    }

    pub fn input(&self) -> Vec<Value> {
        self.input.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn push_output(&self, value: Value) {
        if let Ok(mut output) = self.output.lock() {
            output.push(value);
        }
    }

    pub fn extend_output(&self, values: impl IntoIterator<Item = Value>) {
        if let Ok(mut output) = self.output.lock() {
            output.extend(values);
        }
    }

    pub fn output(&self) -> Vec<Value> {
        self.output.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn clear_output(&self) {
        if let Ok(mut output) = self.output.lock() {
            output.clear();
        }
    }

    pub fn register_command(&self, command: CliCommand) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command);
        }
    }

    pub fn commands(&self) -> Vec<CliCommand> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn add_root_option(&self, option: CliOption) {
        if let Ok(mut options) = self.root_options.lock() {
            options.push(option);
        }
    }

    pub fn root_options(&self) -> Vec<CliOption> {
        self.root_options
            .lock()
            .map(|o| o.clone())
            .unwrap_or_default()
    }

    pub fn set_version(&self, version: impl Into<String>) {
        if let Ok(mut slot) = self.version.lock() {
            *slot = Some(version.into());
        }
    }

    pub fn version(&self) -> Option<String> {
        self.version.lock().ok().and_then(|v| v.clone())
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("input_len", &self.input().len())
            .field("output_len", &self.output().len())
            .field("commands", &self.commands().len())
            .finish()
    }
}
