//! Module lifecycle orchestration.
//!
//! State machine per module id:
//! `unregistered -> registered -> {enabled | disabled} -> unregistered`.
//!
//! The manager owns the three registry maps and the hook registry behind
//! one state lock. Dispatch snapshots the matching callables under the
//! lock, then invokes with the lock released, so hooks may re-enter the
//! manager. Mutating operations are expected to be invoked serially by
//! the CLI front end; no internal mutual exclusion is provided between
//! them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use futures::future::join_all;
use regex::Regex;
use tokio::sync::broadcast;

use crate::config::ConfigStore;
use crate::context::HostContext;
use crate::events::{HostEvent, ModuleOp};
use crate::hooks::{HookClass, HookRegistry};

use super::builtin;
use super::descriptor::{HookCallable, ModuleDescriptor};
use super::error::ModuleError;
use super::metadata::{METADATA_FILE, PackageMetadata};
use super::pm::{PackageRunner, PmError, PmOptions, PmOutput};
use super::resolver::NameResolver;

/// Directory under the base dir where the package manager installs
/// community modules.
pub const MODULE_INSTALL_DIR: &str = "node_modules";

static COMMUNITY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^mh-module-|^@[^/]+/mh-module-").expect("valid regex"));

/// Explicit, fallible constructor for a module descriptor, keyed by the
/// module's stable id. Community module ids are their package names;
/// built-ins keep short ids.
pub type ModuleFactory = Arc<dyn Fn() -> ModuleDescriptor + Send + Sync>;

/// Action of the `module` CLI subcommand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleAction {
    Install,
    Uninstall,
    Upgrade,
    Enable,
    Disable,
}

impl ModuleAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "install" | "add" => Some(Self::Install),
            "uninstall" | "rm" => Some(Self::Uninstall),
            "upgrade" | "up" => Some(Self::Upgrade),
            "enable" | "en" => Some(Self::Enable),
            "disable" | "dis" => Some(Self::Disable),
            _ => None,
        }
    }
}

/// Body of a [`ModuleResult`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultBody {
    Installed {
        installed: Vec<String>,
        already_installed: Vec<String>,
    },
    Removed(Vec<String>),
    Upgraded(Vec<String>),
    Partition {
        succeeded: Vec<String>,
        failed: Vec<String>,
    },
    Message(String),
}

/// Outcome of a mutating module operation. For enable/disable the
/// operation reports overall success and the body partitions per-id
/// outcomes; callers must inspect the body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleResult {
    pub success: bool,
    pub body: ResultBody,
}

#[derive(Default)]
struct ManagerState {
    modules: HashMap<String, Arc<ModuleDescriptor>>,
    enabled: HashMap<String, Arc<ModuleDescriptor>>,
    disabled: HashMap<String, Arc<ModuleDescriptor>>,
    hooks: HookRegistry,
    factories: HashMap<String, ModuleFactory>,
}

pub struct ModuleManager {
    state: Mutex<ManagerState>,
    config: Arc<ConfigStore>,
    events: broadcast::Sender<HostEvent>,
    base_dir: PathBuf,
    resolver: NameResolver,
    runner: Arc<dyn PackageRunner>,
}

impl ModuleManager {
    pub fn new(
        config: Arc<ConfigStore>,
        events: broadcast::Sender<HostEvent>,
        base_dir: PathBuf,
        resolver: NameResolver,
        runner: Arc<dyn PackageRunner>,
    ) -> Self {
        Self {
            state: Mutex::new(ManagerState::default()),
            config,
            events,
            base_dir,
            resolver,
            runner,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: HostEvent) {
        let _ = self.events.send(event);
    }

    pub fn register_factory(&self, id: impl Into<String>, factory: ModuleFactory) {
        self.lock().factories.insert(id.into(), factory);
    }

    /// Load built-in modules, then community modules declared in the
    /// dependency file and present under the install directory.
    pub fn load_all(&self, ctx: &Arc<HostContext>) {
        self.ensure_base_manifest();
        for factory in builtin::all() {
            self.register_module(ctx, factory());
        }
        self.load_community_modules(ctx);
    }

    fn ensure_base_manifest(&self) {
        if self.base_dir.join(METADATA_FILE).exists() {
            return;
        }
        if let Err(error) = PackageMetadata::base_manifest().save(&self.base_dir) {
            tracing::error!(error = %error, "failed to write base module manifest");
        }
    }

    fn load_community_modules(&self, ctx: &Arc<HostContext>) {
        let install_dir = self.base_dir.join(MODULE_INSTALL_DIR);
        if !install_dir.exists() {
            return;
        }
        let manifest = match PackageMetadata::load(&self.base_dir) {
            Ok(manifest) => manifest,
            Err(error) => {
                tracing::warn!(error = %error, "cannot read dependency declaration file");
                return;
            }
        };
        for name in manifest.dependency_names() {
            if !COMMUNITY_NAME.is_match(&name) {
                continue;
            }
            if !install_dir.join(&name).exists() {
                continue;
            }
            self.register_by_id(ctx, &name);
        }
    }

    /// Register a module and run the enable decision: on first encounter
    /// the `install` lifecycle runs exactly once and the module is marked
    /// enabled; afterwards the persisted flag governs. Failures disable
    /// the module and emit a notification; they never propagate.
    pub fn register_module(&self, ctx: &Arc<HostContext>, descriptor: ModuleDescriptor) {
        let descriptor = Arc::new(descriptor);
        let id = descriptor.id().to_string();
        {
            let mut state = self.lock();
            state.modules.insert(id.clone(), descriptor.clone());
            if state.enabled.contains_key(&id) {
                return;
            }
        }
        if let Err(error) = self.try_enable(ctx, &descriptor) {
            tracing::error!(module = %id, error = %error, "module load error");
            self.disable_descriptor(&descriptor);
            self.emit(HostEvent::Notification {
                title: format!("Module {} load error", descriptor.name()),
                body: error.to_string(),
            });
        }
    }

    fn try_enable(
        &self,
        ctx: &Arc<HostContext>,
        descriptor: &Arc<ModuleDescriptor>,
    ) -> crate::Result<()> {
        let key = format!("modules.{}", descriptor.id());
        let enabled = match self.config.get(&key) {
            None => {
                if let Some(install) = descriptor.install() {
                    install(ctx)?;
                }
                self.config.set_path(&key, true)?;
                true
            }
            Some(value) => value.as_bool().unwrap_or(false),
        };
        if enabled {
            let mut state = self.lock();
            state.hooks.bind(descriptor)?;
            state
                .enabled
                .insert(descriptor.id().to_string(), descriptor.clone());
            state.disabled.remove(descriptor.id());
            Ok(())
        } else {
            self.disable_descriptor(descriptor);
            Ok(())
        }
    }

    fn disable_descriptor(&self, descriptor: &Arc<ModuleDescriptor>) {
        let id = descriptor.id();
        {
            let mut state = self.lock();
            state.hooks.unbind(id);
            state.enabled.remove(id);
            state.disabled.insert(id.to_string(), descriptor.clone());
        }
        // a failed persist does not reverse the in-memory disable
        if let Err(error) = self.config.set_path(&format!("modules.{}", id), false) {
            tracing::error!(module = %id, error = %error, "failed to persist disabled state");
        }
    }

    fn load_from_factory(&self, id: &str) -> Result<ModuleDescriptor, ModuleError> {
        let factory = self
            .lock()
            .factories
            .get(id)
            .cloned()
            .ok_or_else(|| ModuleError::NoFactory { id: id.to_string() })?;
        Ok(factory())
    }

    fn register_by_id(&self, ctx: &Arc<HostContext>, id: &str) {
        match self.load_from_factory(id) {
            Ok(descriptor) => self.register_module(ctx, descriptor),
            Err(error) => tracing::error!(module = %id, error = %error, "failed to load module"),
        }
    }

    fn unregister(&self, id: &str) {
        if let Err(error) = self.config.unset_path("modules", id) {
            tracing::error!(module = %id, error = %error, "failed to remove module config entry");
        }
        let mut state = self.lock();
        state.hooks.unbind(id);
        state.modules.remove(id);
        state.enabled.remove(id);
        state.disabled.remove(id);
    }

    async fn exec(
        &self,
        command: &str,
        modules: &[String],
        options: &PmOptions,
        env: &HashMap<String, String>,
    ) -> Result<PmOutput, PmError> {
        let mut options = options.clone();
        if options.registry.is_none() {
            options.registry = self.config.get_string("settings.registry");
        }
        if options.proxy.is_none() {
            options.proxy = self.config.get_string("settings.proxy");
        }
        match self
            .runner
            .run(command, modules, &self.base_dir, &options, env)
            .await
        {
            Err(error @ PmError::NotInstalled { .. }) => {
                tracing::error!(error = %error, "package manager is not installed");
                self.emit(HostEvent::Fatal(error.to_string()));
                Err(error)
            }
            other => other,
        }
    }

    /// Install modules. Names resolving to an already-registered id are
    /// excluded from the package-manager call; the remainder runs as one
    /// batch. Only a zero exit registers the new modules, so in-memory
    /// state never runs ahead of what is on disk.
    pub async fn install(
        &self,
        ctx: &Arc<HostContext>,
        names: &[String],
        options: PmOptions,
        env: HashMap<String, String>,
    ) -> ModuleResult {
        let mut already_installed = Vec::new();
        let mut pending = Vec::new();
        for raw in names {
            let resolved = self.resolver.resolve(raw);
            if !resolved.success {
                continue;
            }
            if self.has(&resolved.canonical_name) {
                tracing::info!(module = %resolved.canonical_name, "module already installed");
                already_installed.push(resolved.canonical_name);
            } else {
                pending.push(resolved);
            }
        }

        if pending.is_empty() {
            if already_installed.is_empty() {
                let message = "Module install failed, please type a valid module name.".to_string();
                return self.fail(ModuleOp::Install, message);
            }
            self.emit(HostEvent::Module {
                op: ModuleOp::Install,
                success: true,
                detail: already_installed.join(","),
            });
            return ModuleResult {
                success: true,
                body: ResultBody::Installed {
                    installed: Vec::new(),
                    already_installed,
                },
            };
        }

        let full_names: Vec<String> = pending.iter().map(|r| r.full_name.clone()).collect();
        let ids: Vec<String> = pending.iter().map(|r| r.canonical_name.clone()).collect();
        match self.exec("install", &full_names, &options, &env).await {
            Ok(output) if output.success() => {
                for id in &ids {
                    self.register_by_id(ctx, id);
                }
                tracing::info!(modules = ?ids, "module install success");
                self.emit(HostEvent::Module {
                    op: ModuleOp::Install,
                    success: true,
                    detail: ids.join(","),
                });
                ModuleResult {
                    success: true,
                    body: ResultBody::Installed {
                        installed: ids,
                        already_installed,
                    },
                }
            }
            Ok(output) => self.fail(
                ModuleOp::Install,
                format!(
                    "Module install failed, status code: {}, message: \n{}",
                    output.code, output.output
                ),
            ),
            Err(error) => self.fail(ModuleOp::Install, error.to_string()),
        }
    }

    /// Uninstall modules: one batched removal; only on success are config
    /// entries removed, hooks unbound, and the modules purged.
    pub async fn uninstall(&self, names: &[String]) -> ModuleResult {
        let ids: Vec<String> = names
            .iter()
            .map(|name| self.resolver.resolve(name))
            .filter(|resolved| resolved.success)
            .map(|resolved| resolved.canonical_name)
            .collect();
        if ids.is_empty() {
            let message = "Module uninstall failed, please type a valid module name.".to_string();
            return self.fail(ModuleOp::Uninstall, message);
        }
        match self
            .exec("uninstall", &ids, &PmOptions::default(), &HashMap::new())
            .await
        {
            Ok(output) if output.success() => {
                for id in &ids {
                    self.unregister(id);
                }
                tracing::info!(modules = ?ids, "module uninstall success");
                self.emit(HostEvent::Module {
                    op: ModuleOp::Uninstall,
                    success: true,
                    detail: ids.join(","),
                });
                ModuleResult {
                    success: true,
                    body: ResultBody::Removed(ids),
                }
            }
            Ok(output) => self.fail(
                ModuleOp::Uninstall,
                format!(
                    "Module uninstall failed, status code: {}, message: \n{}",
                    output.code, output.output
                ),
            ),
            Err(error) => self.fail(ModuleOp::Uninstall, error.to_string()),
        }
    }

    /// Upgrade modules. The running process keeps the previously loaded
    /// version until restart; no re-registration happens on success.
    pub async fn upgrade(
        &self,
        names: &[String],
        options: PmOptions,
        env: HashMap<String, String>,
    ) -> ModuleResult {
        let ids: Vec<String> = names
            .iter()
            .map(|name| self.resolver.resolve(name))
            .filter(|resolved| resolved.success)
            .map(|resolved| resolved.canonical_name)
            .collect();
        if ids.is_empty() {
            let message = "Module upgrade failed, please type a valid module name.".to_string();
            return self.fail(ModuleOp::Upgrade, message);
        }
        match self.exec("update", &ids, &options, &env).await {
            Ok(output) if output.success() => {
                tracing::info!(modules = ?ids, "module upgrade success");
                self.emit(HostEvent::Module {
                    op: ModuleOp::Upgrade,
                    success: true,
                    detail: ids.join(","),
                });
                ModuleResult {
                    success: true,
                    body: ResultBody::Upgraded(ids),
                }
            }
            Ok(output) => self.fail(
                ModuleOp::Upgrade,
                format!(
                    "Module upgrade failed, status code: {}, message: \n{}",
                    output.code, output.output
                ),
            ),
            Err(error) => self.fail(ModuleOp::Upgrade, error.to_string()),
        }
    }

    /// Enable known modules by id. Unknown ids are reported in the failed
    /// partition rather than raising.
    pub fn enable(&self, ctx: &Arc<HostContext>, ids: &[String]) -> ModuleResult {
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for id in ids {
            let Some(descriptor) = self.module(id) else {
                failed.push(id.clone());
                continue;
            };
            if self.has_enabled(id) {
                succeeded.push(id.clone());
                continue;
            }
            let result = self
                .config
                .set_path(&format!("modules.{}", id), true)
                .map_err(crate::Error::from)
                .and_then(|_| self.try_enable(ctx, &descriptor));
            match result {
                Ok(()) => succeeded.push(id.clone()),
                Err(error) => {
                    tracing::error!(module = %id, error = %error, "module enable error");
                    self.disable_descriptor(&descriptor);
                    self.emit(HostEvent::Notification {
                        title: format!("Module {} enable error", descriptor.name()),
                        body: error.to_string(),
                    });
                    failed.push(id.clone());
                }
            }
        }
        if !succeeded.is_empty() {
            tracing::info!(modules = ?succeeded, "enable success modules");
        }
        if !failed.is_empty() {
            tracing::warn!(modules = ?failed, "enable failed modules");
        }
        self.emit(HostEvent::Module {
            op: ModuleOp::Enable,
            success: true,
            detail: ids.join(","),
        });
        ModuleResult {
            success: true,
            body: ResultBody::Partition { succeeded, failed },
        }
    }

    /// Disable currently enabled modules by id. Ids that are not enabled
    /// are reported in the failed partition rather than raising.
    pub fn disable(&self, ids: &[String]) -> ModuleResult {
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for id in ids {
            match self.enabled_module(id) {
                Some(descriptor) => {
                    self.disable_descriptor(&descriptor);
                    succeeded.push(id.clone());
                }
                None => failed.push(id.clone()),
            }
        }
        if !succeeded.is_empty() {
            tracing::info!(modules = ?succeeded, "disable success modules");
        }
        if !failed.is_empty() {
            tracing::warn!(modules = ?failed, "disable failed modules");
        }
        self.emit(HostEvent::Module {
            op: ModuleOp::Disable,
            success: true,
            detail: ids.join(","),
        });
        ModuleResult {
            success: true,
            body: ResultBody::Partition { succeeded, failed },
        }
    }

    fn fail(&self, op: ModuleOp, message: String) -> ModuleResult {
        tracing::error!("{}", message);
        self.emit(HostEvent::Module {
            op,
            success: false,
            detail: message.clone(),
        });
        ModuleResult {
            success: false,
            body: ResultBody::Message(message),
        }
    }

    fn snapshot(&self, class: HookClass, fn_name: Option<&str>) -> Vec<(String, HookCallable)> {
        let state = self.lock();
        state
            .hooks
            .select(class, fn_name)
            .into_iter()
            .filter_map(|key| {
                state
                    .enabled
                    .get(&key.module_id)
                    .and_then(|descriptor| descriptor.hook(&key.fn_name))
                    .map(|callable| (key.storage_key(), callable.clone()))
            })
            .collect()
    }

    fn run_sync(
        &self,
        ctx: &Arc<HostContext>,
        hooks: Vec<(String, HookCallable)>,
    ) -> crate::Result<()> {
        for (index, (key, callable)) in hooks.into_iter().enumerate() {
            let HookCallable::Sync(hook) = callable else {
                continue;
            };
            tracing::debug!(hook = %key, index, "running hook");
            if let Err(error) = hook(ctx) {
                tracing::error!(hook = %key, index, error = %error, "hook failed");
                return Err(error);
            }
        }
        Ok(())
    }

    /// Invoke cli hooks in registration order, optionally filtered to one
    /// hook name. Fail-fast: the first failure aborts the dispatch.
    pub fn invoke_cli(&self, ctx: &Arc<HostContext>, hook_name: Option<&str>) -> crate::Result<()> {
        let fn_name = hook_name.map(|name| HookClass::Cli.fn_name(name));
        self.run_sync(ctx, self.snapshot(HookClass::Cli, fn_name.as_deref()))
    }

    /// Invoke sync app hooks matching `hook_name` in registration order.
    /// Fail-fast: the first failure aborts the dispatch.
    pub fn invoke(&self, ctx: &Arc<HostContext>, hook_name: &str) -> crate::Result<()> {
        let fn_name = HookClass::App.fn_name(hook_name);
        self.run_sync(ctx, self.snapshot(HookClass::App, Some(&fn_name)))
    }

    /// Invoke async app hooks matching `hook_name` concurrently. All
    /// started hooks run to completion; the first failure is surfaced
    /// after every sibling has settled.
    pub async fn invoke_async(&self, ctx: &Arc<HostContext>, hook_name: &str) -> crate::Result<()> {
        let fn_name = HookClass::AppAsync.fn_name(hook_name);
        let hooks = self.snapshot(HookClass::AppAsync, Some(&fn_name));
        let futures: Vec<_> = hooks
            .into_iter()
            .map(|(key, callable)| {
                let ctx = ctx.clone();
                async move {
                    tracing::debug!(hook = %key, "running hook");
                    let result = match callable {
                        HookCallable::Async(hook) => hook(ctx).await,
                        HookCallable::Sync(hook) => hook(&ctx),
                    };
                    if let Err(error) = &result {
                        tracing::error!(hook = %key, error = %error, "hook failed");
                    }
                    result
                }
            })
            .collect();
        join_all(futures)
            .await
            .into_iter()
            .collect::<crate::Result<Vec<_>>>()
            .map(|_| ())
    }

    pub fn module(&self, id: &str) -> Option<Arc<ModuleDescriptor>> {
        self.lock().modules.get(id).cloned()
    }

    pub fn has(&self, id: &str) -> bool {
        self.lock().modules.contains_key(id)
    }

    pub fn enabled_module(&self, id: &str) -> Option<Arc<ModuleDescriptor>> {
        self.lock().enabled.get(id).cloned()
    }

    pub fn has_enabled(&self, id: &str) -> bool {
        self.lock().enabled.contains_key(id)
    }

    pub fn modules(&self) -> Vec<Arc<ModuleDescriptor>> {
        self.lock().modules.values().cloned().collect()
    }

    pub fn enabled_modules(&self) -> Vec<Arc<ModuleDescriptor>> {
        self.lock().enabled.values().cloned().collect()
    }

    pub fn disabled_modules(&self) -> Vec<Arc<ModuleDescriptor>> {
        self.lock().disabled.values().cloned().collect()
    }

    pub fn enabled_count(&self) -> usize {
        self.lock().enabled.len()
    }

    /// Bound hook storage keys in registration order.
    pub fn hook_keys(&self) -> Vec<String> {
        self.lock().hooks.keys()
    }

    pub fn base_dir(&self) -> &std::path::Path {
        &self.base_dir
    }
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ModuleManager")
            .field("modules", &state.modules.len())
            .field("enabled", &state.enabled.len())
            .field("disabled", &state.disabled.len())
            .field("hooks", &state.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::resolver::Vfs;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct EmptyVfs;

    impl Vfs for EmptyVfs {
        fn exists(&self, _path: &Path) -> bool {
            false
        }

        fn read_package(&self, _dir: &Path) -> Option<PackageMetadata> {
            None
        }
    }

    struct MockRunner {
        code: i32,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl MockRunner {
        fn new(code: i32) -> Self {
            Self {
                code,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PackageRunner for MockRunner {
        async fn run(
            &self,
            command: &str,
            modules: &[String],
            _dir: &Path,
            _options: &PmOptions,
            _env: &HashMap<String, String>,
        ) -> Result<PmOutput, PmError> {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), modules.to_vec()));
            Ok(PmOutput {
                code: self.code,
                output: String::new(),
            })
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl PackageRunner for FailingRunner {
        async fn run(
            &self,
            _command: &str,
            _modules: &[String],
            _dir: &Path,
            _options: &PmOptions,
            _env: &HashMap<String, String>,
        ) -> Result<PmOutput, PmError> {
            Err(PmError::NotInstalled {
                program: "npm".into(),
            })
        }
    }

    struct Fixture {
        manager: Arc<ModuleManager>,
        ctx: Arc<HostContext>,
        config: Arc<ConfigStore>,
        events: broadcast::Sender<HostEvent>,
        runner: Arc<MockRunner>,
        _dir: TempDir,
    }

    fn fixture_with_code(code: i32) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::open(dir.path().join("config.json")).unwrap());
        let events = crate::events::channel();
        let ctx = Arc::new(HostContext::new(config.clone(), events.clone()));
        let runner = Arc::new(MockRunner::new(code));
        let manager = Arc::new(ModuleManager::new(
            config.clone(),
            events.clone(),
            dir.path().to_path_buf(),
            NameResolver::with_vfs(Arc::new(EmptyVfs), dir.path().to_path_buf()),
            runner.clone(),
        ));
        ctx.attach_manager(&manager);
        Fixture {
            manager,
            ctx,
            config,
            events,
            runner,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_code(0)
    }

    fn counting_module(id: &str, installs: Arc<AtomicUsize>) -> ModuleDescriptor {
        ModuleDescriptor::builder(id)
            .version("1.0.0")
            .install(move |_| {
                installs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .sync_hook("app__load", |_| Ok(()))
            .build()
    }

    #[test]
    fn test_first_encounter_runs_install_once_and_enables() {
        let f = fixture();
        let installs = Arc::new(AtomicUsize::new(0));

        f.manager
            .register_module(&f.ctx, counting_module("demo", installs.clone()));

        assert_eq!(installs.load(Ordering::SeqCst), 1);
        assert!(f.manager.has_enabled("demo"));
        assert_eq!(f.config.get_bool("modules.demo"), Some(true));
        assert_eq!(f.manager.hook_keys(), ["demo:app__load"]);

        // re-registering an enabled module does not re-run install
        f.manager
            .register_module(&f.ctx, counting_module("demo", installs.clone()));
        assert_eq!(installs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_persisted_false_routes_to_disabled() {
        let f = fixture();
        f.config.set_path("modules.demo", false).unwrap();
        let installs = Arc::new(AtomicUsize::new(0));

        f.manager
            .register_module(&f.ctx, counting_module("demo", installs.clone()));

        assert_eq!(installs.load(Ordering::SeqCst), 0);
        assert!(!f.manager.has_enabled("demo"));
        assert!(f.manager.has("demo"));
        assert_eq!(f.manager.disabled_modules().len(), 1);
        assert!(f.manager.hook_keys().is_empty());
    }

    #[test]
    fn test_install_lifecycle_error_disables_and_notifies() {
        let f = fixture();
        let mut events = f.events.subscribe();

        let failing = ModuleDescriptor::builder("broken")
            .name("Broken")
            .install(|_| Err(crate::Error::Runtime("install exploded".into())))
            .sync_hook("app__load", |_| Ok(()))
            .build();
        f.manager.register_module(&f.ctx, failing);

        assert!(!f.manager.has_enabled("broken"));
        assert!(f.manager.hook_keys().is_empty());
        assert_eq!(f.config.get_bool("modules.broken"), Some(false));

        let event = events.try_recv().unwrap();
        assert!(
            matches!(event, HostEvent::Notification { ref title, .. } if title.contains("Broken"))
        );
    }

    #[test]
    fn test_duplicate_hook_bind_disables_module() {
        let f = fixture();
        let twice = ModuleDescriptor::builder("dup")
            .sync_hook("app__x", |_| Ok(()))
            .sync_hook("app__x", |_| Ok(()))
            .build();

        f.manager.register_module(&f.ctx, twice);

        assert!(!f.manager.has_enabled("dup"));
        assert_eq!(f.manager.disabled_modules().len(), 1);
        assert!(f.manager.hook_keys().is_empty());
    }

    #[tokio::test]
    async fn test_install_partitions_already_and_new() {
        let f = fixture();
        f.manager.register_module(
            &f.ctx,
            ModuleDescriptor::builder("mh-module-old").build(),
        );
        f.manager.register_factory(
            "mh-module-new",
            Arc::new(|| ModuleDescriptor::builder("mh-module-new").build()),
        );
        let enabled_before = f.manager.enabled_count();

        let result = f
            .manager
            .install(
                &f.ctx,
                &["old".into(), "new".into()],
                PmOptions::default(),
                HashMap::new(),
            )
            .await;

        // only the new module reaches the package manager
        assert_eq!(
            f.runner.calls(),
            [("install".to_string(), vec!["mh-module-new".to_string()])]
        );
        assert!(result.success);
        assert_eq!(
            result.body,
            ResultBody::Installed {
                installed: vec!["mh-module-new".into()],
                already_installed: vec!["mh-module-old".into()],
            }
        );
        assert_eq!(f.manager.enabled_count(), enabled_before + 1);
    }

    #[tokio::test]
    async fn test_install_nonzero_exit_registers_nothing() {
        let f = fixture_with_code(1);
        f.manager.register_factory(
            "mh-module-new",
            Arc::new(|| ModuleDescriptor::builder("mh-module-new").build()),
        );

        let result = f
            .manager
            .install(
                &f.ctx,
                &["new".into()],
                PmOptions::default(),
                HashMap::new(),
            )
            .await;

        assert!(!result.success);
        assert!(matches!(result.body, ResultBody::Message(_)));
        assert_eq!(f.manager.enabled_count(), 0);
        assert!(!f.manager.has("mh-module-new"));
    }

    #[tokio::test]
    async fn test_install_without_valid_names_fails() {
        let f = fixture();
        let result = f
            .manager
            .install(&f.ctx, &[], PmOptions::default(), HashMap::new())
            .await;

        assert!(!result.success);
        assert!(f.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_install_spawn_error_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::open(dir.path().join("config.json")).unwrap());
        let events = crate::events::channel();
        let ctx = Arc::new(HostContext::new(config.clone(), events.clone()));
        let manager = ModuleManager::new(
            config,
            events.clone(),
            dir.path().to_path_buf(),
            NameResolver::with_vfs(Arc::new(EmptyVfs), dir.path().to_path_buf()),
            Arc::new(FailingRunner),
        );
        let mut receiver = events.subscribe();

        let result = manager
            .install(&ctx, &["new".into()], PmOptions::default(), HashMap::new())
            .await;

        assert!(!result.success);
        let mut saw_fatal = false;
        while let Ok(event) = receiver.try_recv() {
            if matches!(event, HostEvent::Fatal(_)) {
                saw_fatal = true;
            }
        }
        assert!(saw_fatal);
    }

    #[tokio::test]
    async fn test_uninstall_purges_module() {
        let f = fixture();
        f.manager.register_module(
            &f.ctx,
            ModuleDescriptor::builder("mh-module-gone")
                .sync_hook("app__load", |_| Ok(()))
                .build(),
        );
        assert!(f.manager.has("mh-module-gone"));

        let result = f.manager.uninstall(&["gone".into()]).await;

        assert!(result.success);
        assert_eq!(result.body, ResultBody::Removed(vec!["mh-module-gone".into()]));
        assert_eq!(
            f.runner.calls(),
            [("uninstall".to_string(), vec!["mh-module-gone".to_string()])]
        );
        assert!(!f.manager.has("mh-module-gone"));
        assert!(f.manager.hook_keys().is_empty());
        assert_eq!(f.config.get("modules.mh-module-gone"), None);
    }

    #[tokio::test]
    async fn test_uninstall_nonzero_exit_keeps_module() {
        let f = fixture_with_code(1);
        f.manager.register_module(
            &f.ctx,
            ModuleDescriptor::builder("mh-module-keep").build(),
        );

        let result = f.manager.uninstall(&["keep".into()]).await;

        assert!(!result.success);
        assert!(f.manager.has("mh-module-keep"));
        assert_eq!(f.config.get_bool("modules.mh-module-keep"), Some(true));
    }

    #[tokio::test]
    async fn test_upgrade_does_not_rebind() {
        let f = fixture();
        f.manager.register_module(
            &f.ctx,
            ModuleDescriptor::builder("mh-module-up")
                .sync_hook("app__load", |_| Ok(()))
                .build(),
        );
        let keys_before = f.manager.hook_keys();

        let result = f
            .manager
            .upgrade(&["up".into()], PmOptions::default(), HashMap::new())
            .await;

        assert!(result.success);
        assert_eq!(result.body, ResultBody::Upgraded(vec!["mh-module-up".into()]));
        assert_eq!(
            f.runner.calls(),
            [("update".to_string(), vec!["mh-module-up".to_string()])]
        );
        assert_eq!(f.manager.hook_keys(), keys_before);
    }

    #[test]
    fn test_enable_disable_partitions() {
        let f = fixture();
        f.manager
            .register_module(&f.ctx, ModuleDescriptor::builder("a").build());

        let result = f.manager.disable(&["a".into(), "missing".into()]);
        assert!(result.success);
        assert_eq!(
            result.body,
            ResultBody::Partition {
                succeeded: vec!["a".into()],
                failed: vec!["missing".into()],
            }
        );

        // disabling twice: the disabled set is unchanged and nothing raises
        let again = f.manager.disable(&["a".into()]);
        assert_eq!(
            again.body,
            ResultBody::Partition {
                succeeded: vec![],
                failed: vec!["a".into()],
            }
        );
        assert_eq!(f.manager.disabled_modules().len(), 1);
    }

    #[test]
    fn test_enable_disabled_module_readds_exactly_its_keys() {
        let f = fixture();
        f.manager.register_module(
            &f.ctx,
            ModuleDescriptor::builder("a")
                .sync_hook("app__x", |_| Ok(()))
                .sync_hook("cli__y", |_| Ok(()))
                .build(),
        );
        f.manager.register_module(
            &f.ctx,
            ModuleDescriptor::builder("b")
                .sync_hook("app__x", |_| Ok(()))
                .build(),
        );

        f.manager.disable(&["a".into()]);
        assert_eq!(f.manager.hook_keys(), ["b:app__x"]);
        assert_eq!(f.config.get_bool("modules.a"), Some(false));

        let result = f.manager.enable(&f.ctx, &["a".into()]);
        assert!(result.success);
        assert_eq!(
            result.body,
            ResultBody::Partition {
                succeeded: vec!["a".into()],
                failed: vec![],
            }
        );
        assert_eq!(f.manager.hook_keys(), ["b:app__x", "a:app__x", "a:cli__y"]);
        assert_eq!(f.config.get_bool("modules.a"), Some(true));

        // enabling an enabled module is a no-op success
        let again = f.manager.enable(&f.ctx, &["a".into()]);
        assert_eq!(
            again.body,
            ResultBody::Partition {
                succeeded: vec!["a".into()],
                failed: vec![],
            }
        );
        assert_eq!(f.manager.hook_keys(), ["b:app__x", "a:app__x", "a:cli__y"]);
    }

    #[test]
    fn test_enable_unknown_module_fails_without_raising() {
        let f = fixture();
        let result = f.manager.enable(&f.ctx, &["ghost".into()]);
        assert!(result.success);
        assert_eq!(
            result.body,
            ResultBody::Partition {
                succeeded: vec![],
                failed: vec!["ghost".into()],
            }
        );
    }

    #[test]
    fn test_sync_dispatch_in_registration_order() {
        let f = fixture();
        // register b before a: dispatch order must follow registration,
        // not the alphabetical id order
        f.manager.register_module(
            &f.ctx,
            ModuleDescriptor::builder("b")
                .sync_hook("app__x", |ctx| {
                    ctx.push_output(json!("b"));
                    Ok(())
                })
                .build(),
        );
        f.manager.register_module(
            &f.ctx,
            ModuleDescriptor::builder("a")
                .sync_hook("app__x", |ctx| {
                    ctx.push_output(json!("a"));
                    Ok(())
                })
                .build(),
        );

        f.manager.invoke(&f.ctx, "x").unwrap();
        assert_eq!(f.ctx.output(), vec![json!("b"), json!("a")]);
    }

    #[test]
    fn test_sync_dispatch_fails_fast() {
        let f = fixture();
        let later = Arc::new(AtomicUsize::new(0));
        let later_in_hook = later.clone();
        f.manager.register_module(
            &f.ctx,
            ModuleDescriptor::builder("first")
                .sync_hook("app__x", |_| Err(crate::Error::Runtime("boom".into())))
                .build(),
        );
        f.manager.register_module(
            &f.ctx,
            ModuleDescriptor::builder("second")
                .sync_hook("app__x", move |_| {
                    later_in_hook.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build(),
        );

        let err = f.manager.invoke(&f.ctx, "x").unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_disabled_module_hooks_are_skipped() {
        let f = fixture();
        f.manager.register_module(
            &f.ctx,
            ModuleDescriptor::builder("a")
                .sync_hook("app__x", |ctx| {
                    ctx.push_output(json!("a"));
                    Ok(())
                })
                .build(),
        );
        f.manager.disable(&["a".into()]);

        f.manager.invoke(&f.ctx, "x").unwrap();
        assert!(f.ctx.output().is_empty());
    }

    #[tokio::test]
    async fn test_async_dispatch_runs_all_before_surfacing_failure() {
        let f = fixture();
        let fast_ran = Arc::new(AtomicUsize::new(0));
        let fast_in_hook = fast_ran.clone();
        f.manager.register_module(
            &f.ctx,
            ModuleDescriptor::builder("fast")
                .async_hook("app_async__x", move |_| {
                    let fast = fast_in_hook.clone();
                    async move {
                        fast.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .build(),
        );
        f.manager.register_module(
            &f.ctx,
            ModuleDescriptor::builder("slow")
                .async_hook("app_async__x", |_| async {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    Err(crate::Error::Runtime("slow hook rejected".into()))
                })
                .build(),
        );

        let err = f.manager.invoke_async(&f.ctx, "x").await.unwrap_err();
        assert!(err.to_string().contains("slow hook rejected"));
        // the fast sibling's side effect is observable despite the failure
        assert_eq!(fast_ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_dispatch_without_hooks_is_ok() {
        let f = fixture();
        f.manager.invoke_async(&f.ctx, "nothing").await.unwrap();
    }

    #[test]
    fn test_community_discovery_filters_by_prefix_and_presence() {
        let f = fixture();
        let base = f.manager.base_dir().to_path_buf();
        let mut manifest = PackageMetadata::base_manifest();
        manifest
            .dependencies
            .insert("mh-module-good".into(), "1.0.0".into());
        manifest
            .dependencies
            .insert("left-pad".into(), "1.3.0".into());
        manifest
            .dependencies
            .insert("mh-module-absent".into(), "1.0.0".into());
        manifest.save(&base).unwrap();
        std::fs::create_dir_all(base.join(MODULE_INSTALL_DIR).join("mh-module-good")).unwrap();

        f.manager.register_factory(
            "mh-module-good",
            Arc::new(|| ModuleDescriptor::builder("mh-module-good").build()),
        );
        f.manager.load_all(&f.ctx);

        assert!(f.manager.has_enabled("system"));
        assert!(f.manager.has_enabled("database"));
        assert!(f.manager.has_enabled("mh-module-good"));
        assert!(!f.manager.has("left-pad"));
        assert!(!f.manager.has("mh-module-absent"));
    }

    #[test]
    fn test_module_action_parse() {
        assert_eq!(ModuleAction::parse("install"), Some(ModuleAction::Install));
        assert_eq!(ModuleAction::parse("add"), Some(ModuleAction::Install));
        assert_eq!(ModuleAction::parse("rm"), Some(ModuleAction::Uninstall));
        assert_eq!(ModuleAction::parse("up"), Some(ModuleAction::Upgrade));
        assert_eq!(ModuleAction::parse("en"), Some(ModuleAction::Enable));
        assert_eq!(ModuleAction::parse("dis"), Some(ModuleAction::Disable));
        assert_eq!(ModuleAction::parse("explode"), None);
    }
}
