use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Schema validation error: {0}")]
    Validation(String),

    #[error("Schema mapping error: {0}")]
    Mapping(String),

    #[error("Provisioning error: {0}")]
    Provision(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, UploadError>;

/// Character cap for diagnostics written to the upload log.
pub const MESSAGE_LIMIT: usize = 1020;

/// Truncates a diagnostic to `MESSAGE_LIMIT` characters. Indexing by chars
/// rather than bytes so a multi-byte sequence is never split.
pub fn truncate_message(message: &str) -> String {
    match message.char_indices().nth(MESSAGE_LIMIT) {
        Some((byte_idx, _)) => message[..byte_idx].to_string(),
        None => message.to_string(),
    }
}
