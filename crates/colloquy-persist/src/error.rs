use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Path outside of storage root: {0}")]
    InvalidPath(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PersistError>;

/// Reject ids that would escape their directory
pub(crate) fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
        return Err(PersistError::InvalidId(id.to_string()));
    }
    Ok(())
}
