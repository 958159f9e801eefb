use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::HostContext;
use crate::hooks::HookClass;

/// Synchronous hook or lifecycle callable.
pub type SyncHookFn = Arc<dyn Fn(&HostContext) -> crate::Result<()> + Send + Sync>;

/// Asynchronous hook callable.
pub type AsyncHookFn =
    Arc<dyn Fn(Arc<HostContext>) -> BoxFuture<'static, crate::Result<()>> + Send + Sync>;

/// A hook callable carried by a module descriptor.
///
/// The two variants are the closed replacement for an open property bag:
/// the callable kind is validated against the hook class at bind time.
#[derive(Clone)]
pub enum HookCallable {
    Sync(SyncHookFn),
    Async(AsyncHookFn),
}

impl HookCallable {
    pub fn kind(&self) -> &'static str {
        match self {
            HookCallable::Sync(_) => "sync",
            HookCallable::Async(_) => "async",
        }
    }

    /// Whether this callable kind satisfies the given hook class.
    pub fn matches(&self, class: HookClass) -> bool {
        match class {
            HookClass::Cli | HookClass::App => matches!(self, HookCallable::Sync(_)),
            HookClass::AppAsync => matches!(self, HookCallable::Async(_)),
        }
    }
}

impl std::fmt::Debug for HookCallable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// An independently distributable unit of behavior: metadata, lifecycle
/// callables, and an ordered list of hook functions.
///
/// Identity is `id`; two descriptors with the same id are the same module
/// regardless of source. Hook order within the descriptor is declaration
/// order and is preserved by the registry.
#[derive(Clone)]
pub struct ModuleDescriptor {
    id: String,
    name: String,
    version: String,
    core: String,
    description: Option<String>,
    dependencies: Vec<String>,
    install: Option<SyncHookFn>,
    uninstall: Option<SyncHookFn>,
    config: Option<SyncHookFn>,
    hooks: Vec<(String, HookCallable)>,
}

impl ModuleDescriptor {
    pub fn builder(id: impl Into<String>) -> ModuleDescriptorBuilder {
        ModuleDescriptorBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Host compatibility range, e.g. `1.x`.
    pub fn core(&self) -> &str {
        &self.core
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn install(&self) -> Option<&SyncHookFn> {
        self.install.as_ref()
    }

    pub fn uninstall(&self) -> Option<&SyncHookFn> {
        self.uninstall.as_ref()
    }

    pub fn config(&self) -> Option<&SyncHookFn> {
        self.config.as_ref()
    }

    /// All declared hooks in declaration order.
    pub fn hooks(&self) -> &[(String, HookCallable)] {
        &self.hooks
    }

    /// Look up one hook callable by its full function name.
    pub fn hook(&self, fn_name: &str) -> Option<&HookCallable> {
        self.hooks
            .iter()
            .find(|(name, _)| name == fn_name)
            .map(|(_, callable)| callable)
    }
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("core", &self.core)
            .field(
                "hooks",
                &self.hooks.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

pub struct ModuleDescriptorBuilder {
    id: String,
    name: Option<String>,
    version: String,
    core: String,
    description: Option<String>,
    dependencies: Vec<String>,
    install: Option<SyncHookFn>,
    uninstall: Option<SyncHookFn>,
    config: Option<SyncHookFn>,
    hooks: Vec<(String, HookCallable)>,
}

impl ModuleDescriptorBuilder {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            version: "0.0.0".into(),
            core: "1.x".into(),
            description: None,
            dependencies: Vec::new(),
            install: None,
            uninstall: None,
            config: None,
            hooks: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn core(mut self, core: impl Into<String>) -> Self {
        self.core = core.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn install<F>(mut self, f: F) -> Self
    where
        F: Fn(&HostContext) -> crate::Result<()> + Send + Sync + 'static,
    {
        self.install = Some(Arc::new(f));
        self
    }

    pub fn uninstall<F>(mut self, f: F) -> Self
    where
        F: Fn(&HostContext) -> crate::Result<()> + Send + Sync + 'static,
    {
        self.uninstall = Some(Arc::new(f));
        self
    }

    pub fn config<F>(mut self, f: F) -> Self
    where
        F: Fn(&HostContext) -> crate::Result<()> + Send + Sync + 'static,
    {
        self.config = Some(Arc::new(f));
        self
    }

    /// Declare a synchronous hook under its full function name
    /// (e.g. `cli__core`, `app__db_load`).
    pub fn sync_hook<F>(mut self, fn_name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&HostContext) -> crate::Result<()> + Send + Sync + 'static,
    {
        self.hooks
            .push((fn_name.into(), HookCallable::Sync(Arc::new(f))));
        self
    }

    /// Declare an asynchronous hook under its full function name
    /// (e.g. `app_async__data_export`).
    pub fn async_hook<F, Fut>(mut self, fn_name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<HostContext>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = crate::Result<()>> + Send + 'static,
    {
        self.hooks.push((
            fn_name.into(),
            HookCallable::Async(Arc::new(move |ctx| Box::pin(f(ctx)))),
        ));
        self
    }

    pub fn build(self) -> ModuleDescriptor {
        let name = self.name.unwrap_or_else(|| self.id.clone());
        ModuleDescriptor {
            id: self.id,
            name,
            version: self.version,
            core: self.core,
            description: self.description,
            dependencies: self.dependencies,
            install: self.install,
            uninstall: self.uninstall,
            config: self.config,
            hooks: self.hooks,
        }
    }
}
