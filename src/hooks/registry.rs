//! Registration-ordered set of bound hook keys.

use std::collections::HashSet;

use crate::modules::ModuleDescriptor;

use super::error::HookError;
use super::key::{HookClass, HookKey, MODULE_SPLIT};

/// Owns the set of bound hook keys.
///
/// Keys are kept in registration order for the lifetime of the registry;
/// re-binding a module after an unbind appends its keys at the end. The
/// registry stores keys only — callables are looked up on the owning
/// descriptor at dispatch time, so a module that has been disabled since
/// binding is skipped rather than invoked.
#[derive(Default)]
pub struct HookRegistry {
    order: Vec<HookKey>,
    index: HashSet<String>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every recognized hook of a descriptor.
    ///
    /// The whole bind is validated before any insertion: a duplicate key,
    /// a callable whose kind does not match its class, or a module id
    /// containing the separator rejects the bind and leaves the registry
    /// unchanged. Properties without a recognized prefix are ignored.
    pub fn bind(&mut self, module: &ModuleDescriptor) -> Result<(), HookError> {
        if module.id().contains(MODULE_SPLIT) {
            return Err(HookError::ReservedSeparator {
                id: module.id().to_string(),
                separator: MODULE_SPLIT,
            });
        }

        let mut batch = Vec::new();
        let mut batch_keys = HashSet::new();
        for (fn_name, callable) in module.hooks() {
            let Some(class) = HookClass::of(fn_name) else {
                continue;
            };
            let key = HookKey {
                module_id: module.id().to_string(),
                fn_name: fn_name.clone(),
                class,
            };
            let storage = key.storage_key();
            if !callable.matches(class) {
                return Err(HookError::CallableMismatch {
                    key: storage,
                    declared: callable.kind(),
                    required: match class {
                        HookClass::Cli | HookClass::App => "sync",
                        HookClass::AppAsync => "async",
                    },
                });
            }
            if self.index.contains(&storage) || !batch_keys.insert(storage.clone()) {
                return Err(HookError::DuplicateKey { key: storage });
            }
            batch.push(key);
        }

        for key in batch {
            self.index.insert(key.storage_key());
            self.order.push(key);
        }
        Ok(())
    }

    /// Remove every bound key of a module. Idempotent: unbinding an
    /// unbound module removes nothing.
    pub fn unbind(&mut self, module_id: &str) -> usize {
        let before = self.order.len();
        let index = &mut self.index;
        self.order.retain(|key| {
            if key.module_id == module_id {
                index.remove(&key.storage_key());
                false
            } else {
                true
            }
        });
        before - self.order.len()
    }

    /// All keys of a class in registration order, optionally filtered to
    /// an exact hook function name.
    pub fn select(&self, class: HookClass, fn_name: Option<&str>) -> Vec<&HookKey> {
        self.order
            .iter()
            .filter(|key| key.class == class)
            .filter(|key| fn_name.is_none_or(|name| key.fn_name == name))
            .collect()
    }

    pub fn contains(&self, module_id: &str, fn_name: &str) -> bool {
        self.index
            .contains(&super::key::compose(module_id, fn_name))
    }

    /// All bound storage keys in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.order.iter().map(HookKey::storage_key).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hook_count", &self.order.len())
            .field("keys", &self.keys())
            .finish()
    }
}
