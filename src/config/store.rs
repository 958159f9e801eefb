//! File-backed JSON config store.
//!
//! The durable source of truth for module enablement and host settings.
//! Keys use dot notation (`modules.system`, `settings.registry`). Writes
//! persist immediately with pretty-printed JSON.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value, json};

/// Top-level keys that must never be modified or removed through the
/// host's generic set/unset surface. The module table lives here; the
/// module manager persists enablement through the store's direct path API
/// instead.
pub const DENY_LIST: &[&str] = &["modules"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("The configuration file only supports JSON format: {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub struct ConfigStore {
    path: PathBuf,
    doc: Mutex<Value>,
}

impl ConfigStore {
    /// Open (or create) the config document at `path`, ensuring the
    /// `modules` table exists.
    pub fn open(path: PathBuf) -> Result<Self, ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut doc = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            json!({})
        };

        if !doc.is_object() {
            doc = json!({});
        }
        let store = Self {
            path,
            doc: Mutex::new(doc),
        };
        store.with_doc(|doc| {
            if let Some(map) = doc.as_object_mut()
                && !map.contains_key("modules")
            {
                map.insert("modules".into(), json!({}));
                return true;
            }
            false
        })?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A clone of the whole document.
    pub fn document(&self) -> Value {
        self.doc
            .lock()
            .map(|doc| doc.clone())
            .unwrap_or_else(|_| json!({}))
    }

    /// Look a dot-path up in the document.
    pub fn get(&self, key: &str) -> Option<Value> {
        let doc = self.doc.lock().ok()?;
        let mut current = &*doc;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current.clone())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Set a dot-path, creating intermediate objects, and persist.
    ///
    /// This is the direct API; deny-list enforcement belongs to the
    /// host-facing wrappers.
    pub fn set_path(&self, key: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let value = value.into();
        self.with_doc(|doc| {
            let mut current = doc;
            let mut parts = key.split('.').peekable();
            while let Some(part) = parts.next() {
                if parts.peek().is_none() {
                    if let Some(map) = as_object_mut(current) {
                        map.insert(part.to_string(), value.clone());
                    }
                    break;
                }
                let map = match as_object_mut(current) {
                    Some(map) => map,
                    None => break,
                };
                current = map.entry(part.to_string()).or_insert_with(|| json!({}));
            }
            true
        })
    }

    /// Remove `prop` from the object at dot-path `key` and persist.
    /// Returns whether anything was removed.
    pub fn unset_path(&self, key: &str, prop: &str) -> Result<bool, ConfigError> {
        let mut removed = false;
        self.with_doc(|doc| {
            let mut current = &mut *doc;
            for part in key.split('.') {
                match current.get_mut(part) {
                    Some(next) => current = next,
                    None => return false,
                }
            }
            if let Some(map) = current.as_object_mut() {
                removed = map.remove(prop).is_some();
            }
            removed
        })?;
        Ok(removed)
    }

    /// Whether a key is protected from the generic set/unset surface.
    pub fn is_denied(key: &str) -> bool {
        DENY_LIST.iter().any(|denied| key.starts_with(denied))
    }

    /// A valid generic-surface input is a non-empty JSON object.
    pub fn is_valid_input(value: &Value) -> bool {
        value.as_object().is_some_and(|map| !map.is_empty())
    }

    fn with_doc(&self, mutate: impl FnOnce(&mut Value) -> bool) -> Result<(), ConfigError> {
        let snapshot = {
            let mut doc = self
                .doc
                .lock()
                .map_err(|_| ConfigError::Io(std::io::Error::other("config lock poisoned")))?;
            if !mutate(&mut doc) {
                return Ok(());
            }
            doc.clone()
        };
        self.persist(&snapshot)
    }

    fn persist(&self, doc: &Value) -> Result<(), ConfigError> {
        std::fs::write(&self.path, serde_json::to_string_pretty(doc)?)?;
        Ok(())
    }
}

fn as_object_mut(value: &mut Value) -> Option<&mut Map<String, Value>> {
    if !value.is_object() {
        *value = json!({});
    }
    value.as_object_mut()
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("path", &self.path)
            .finish()
    }
}
