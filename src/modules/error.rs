use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("Module '{id}' is not registered")]
    Unknown { id: String },

    #[error("No module factory registered for '{id}'")]
    NoFactory { id: String },

    #[error("Module metadata not found: {path}")]
    MetadataNotFound { path: PathBuf },

    #[error("Invalid module metadata at {path}: {reason}")]
    InvalidMetadata { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
