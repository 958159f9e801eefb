#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Hook key '{key}' already exists")]
    DuplicateKey { key: String },

    #[error("Hook '{key}' is declared {declared} but its class requires a {required} callable")]
    CallableMismatch {
        key: String,
        declared: &'static str,
        required: &'static str,
    },

    #[error("Module id '{id}' must not contain the separator '{separator}'")]
    ReservedSeparator { id: String, separator: char },
}
