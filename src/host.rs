//! Host boot and top-level surface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::ConfigStore;
use crate::context::HostContext;
use crate::events::HostEvent;
use crate::modules::{
    ModuleAction, ModuleFactory, ModuleManager, ModuleResult, NameResolver, NpmRunner,
    PackageRunner, PmOptions,
};

const CONFIG_DIR: &str = ".modhost";
const CONFIG_FILE: &str = "config.json";

/// The extensible host: boots the config store, the execution context and
/// the module manager, loads built-in and community modules, and exposes
/// phase dispatch plus the generic config surface.
pub struct Host {
    config: Arc<ConfigStore>,
    ctx: Arc<HostContext>,
    manager: Arc<ModuleManager>,
    events: broadcast::Sender<HostEvent>,
    base_dir: PathBuf,
}

pub struct HostBuilder {
    config_path: Option<PathBuf>,
    runner: Option<Arc<dyn PackageRunner>>,
    factories: Vec<(String, ModuleFactory)>,
}

impl HostBuilder {
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn runner(mut self, runner: Arc<dyn PackageRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Register a community-module factory ahead of discovery.
    pub fn factory(mut self, id: impl Into<String>, factory: ModuleFactory) -> Self {
        self.factories.push((id.into(), factory));
        self
    }

    pub fn build(self) -> crate::Result<Host> {
        let config_path = validate_config_path(self.config_path);
        let base_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let config = Arc::new(ConfigStore::open(config_path)?);
        let events = crate::events::channel();
        let ctx = Arc::new(HostContext::new(config.clone(), events.clone()));
        let runner = self.runner.unwrap_or_else(|| Arc::new(NpmRunner::new()));
        let manager = Arc::new(ModuleManager::new(
            config.clone(),
            events.clone(),
            base_dir.clone(),
            NameResolver::new(),
            runner,
        ));
        for (id, factory) in self.factories {
            manager.register_factory(id, factory);
        }
        ctx.attach_manager(&manager);
        manager.load_all(&ctx);

        Ok(Host {
            config,
            ctx,
            manager,
            events,
            base_dir,
        })
    }
}

impl Host {
    pub fn builder() -> HostBuilder {
        HostBuilder {
            config_path: None,
            runner: None,
            factories: Vec::new(),
        }
    }

    /// Boot with the default config path (`~/.modhost/config.json`) and
    /// the real package manager.
    pub fn new() -> crate::Result<Self> {
        Self::builder().build()
    }

    pub fn context(&self) -> &Arc<HostContext> {
        &self.ctx
    }

    pub fn manager(&self) -> &Arc<ModuleManager> {
        &self.manager
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config_path(&self) -> &Path {
        self.config.path()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    /// Dispatch all cli hooks so modules can declare their commands.
    pub fn load_cli_commands(&self) -> crate::Result<()> {
        self.manager.invoke_cli(&self.ctx, None)
    }

    /// Run a synchronous app phase: the input sequence is installed on the
    /// context, the output sequence is cleared, and matching `app__` hooks
    /// run in registration order.
    ///
    /// A hook failure aborts the dispatch; it is logged and swallowed
    /// unless the `debug` config flag is set, in which case it propagates.
    pub fn run_app_phase(&self, hook_name: &str, input: Vec<Value>) -> crate::Result<()> {
        self.ctx.set_input(input);
        self.ctx.clear_output();
        match self.manager.invoke(&self.ctx, hook_name) {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::error!(phase = hook_name, error = %error, "app phase failed");
                if self.config.get_bool("debug").unwrap_or(false) {
                    Err(error)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Dispatch matching `app_async__` hooks concurrently.
    pub async fn run_async_phase(&self, hook_name: &str) -> crate::Result<()> {
        self.manager.invoke_async(&self.ctx, hook_name).await
    }

    /// The `module` subcommand surface: dispatch one management action.
    pub async fn run_module_action(
        &self,
        action: ModuleAction,
        names: &[String],
        options: PmOptions,
    ) -> ModuleResult {
        match action {
            ModuleAction::Install => {
                self.manager
                    .install(&self.ctx, names, options, HashMap::new())
                    .await
            }
            ModuleAction::Uninstall => self.manager.uninstall(names).await,
            ModuleAction::Upgrade => self.manager.upgrade(names, options, HashMap::new()).await,
            ModuleAction::Enable => self.manager.enable(&self.ctx, names),
            ModuleAction::Disable => self.manager.disable(names),
        }
    }

    /// Look a dot-path up in the config document; `None` key returns the
    /// whole document.
    pub fn get_config(&self, key: Option<&str>) -> Option<Value> {
        match key {
            Some(key) => self.config.get(key),
            None => Some(self.config.document()),
        }
    }

    /// Apply a non-empty JSON object of dot-path keys to the config and
    /// persist. Deny-listed keys are skipped with a warning; each applied
    /// key emits a `ConfigChanged` event.
    pub fn save_config(&self, config: Value) {
        if !ConfigStore::is_valid_input(&config) {
            tracing::warn!("the format of config is invalid, please provide a non-empty object");
            return;
        }
        let Some(entries) = config.as_object() else {
            return;
        };
        for (key, value) in entries {
            if ConfigStore::is_denied(key) {
                tracing::warn!(key = %key, "the config key can't be modified");
                continue;
            }
            match self.config.set_path(key, value.clone()) {
                Ok(()) => {
                    let _ = self.events.send(HostEvent::ConfigChanged { key: key.clone() });
                }
                Err(error) => {
                    tracing::error!(key = %key, error = %error, "failed to save config")
                }
            }
        }
    }

    /// Remove `prop` from the object at config key `key` and persist.
    /// Deny-listed keys are left untouched with a warning.
    pub fn remove_config(&self, key: &str, prop: &str) {
        if key.is_empty() || prop.is_empty() {
            return;
        }
        if ConfigStore::is_denied(key) {
            tracing::warn!(key = %key, "the config key can't be removed");
            return;
        }
        if let Err(error) = self.config.unset_path(key, prop) {
            tracing::error!(key = %key, error = %error, "failed to remove config");
        }
    }
}

fn validate_config_path(path: Option<PathBuf>) -> PathBuf {
    let Some(path) = path else {
        return default_config_path();
    };
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        path
    } else {
        tracing::warn!(
            path = %path.display(),
            "the configuration file only supports JSON format, falling back to the default path"
        );
        default_config_path()
    }
}

fn default_config_path() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE)
}
