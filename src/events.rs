//! Host event channel.
//!
//! Cross-cutting notifications flow through an explicit broadcast channel
//! with a closed set of event kinds, so subscribers are statically
//! enumerable rather than implicit listeners on a process-wide bus.

use tokio::sync::broadcast;

pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Mutating module operations reported on the event channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleOp {
    Install,
    Uninstall,
    Upgrade,
    Enable,
    Disable,
}

impl std::fmt::Display for ModuleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleOp::Install => write!(f, "install"),
            ModuleOp::Uninstall => write!(f, "uninstall"),
            ModuleOp::Upgrade => write!(f, "upgrade"),
            ModuleOp::Enable => write!(f, "enable"),
            ModuleOp::Disable => write!(f, "disable"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    /// A user-facing notice, e.g. a module load error.
    Notification { title: String, body: String },

    /// A fatal collaborator condition, e.g. the package manager missing.
    Fatal(String),

    /// A config key changed through the host's generic surface.
    ConfigChanged { key: String },

    /// Outcome of a mutating module operation.
    Module {
        op: ModuleOp,
        success: bool,
        detail: String,
    },
}

pub(crate) fn channel() -> broadcast::Sender<HostEvent> {
    broadcast::channel(DEFAULT_EVENT_CAPACITY).0
}
