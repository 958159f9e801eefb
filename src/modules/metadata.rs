use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ModuleError;

/// Package-description file at a module's root (also used as the host's
/// base dependency-declaration file).
pub const METADATA_FILE: &str = "package.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(
        default,
        rename = "devDependencies",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub dev_dependencies: BTreeMap<String, String>,
}

impl PackageMetadata {
    /// Load `package.json` from a directory.
    pub fn load(dir: &Path) -> Result<Self, ModuleError> {
        let path = dir.join(METADATA_FILE);
        if !path.exists() {
            return Err(ModuleError::MetadataNotFound { path });
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| ModuleError::InvalidMetadata {
            path,
            reason: e.to_string(),
        })
    }

    /// Write `package.json` into a directory.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, ModuleError> {
        let path = dir.join(METADATA_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// Declared dependency names, regular before dev.
    pub fn dependency_names(&self) -> Vec<String> {
        self.dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .cloned()
            .collect()
    }

    /// The declaration file seeded at the host base directory on first boot.
    pub fn base_manifest() -> Self {
        Self {
            name: "modhost-base".into(),
            version: None,
            main: None,
            description: Some("modhost module base".into()),
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
        }
    }
}
