use thiserror::Error;

use convo_shared::{ConvoError, Key};

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A lookup that required a document found none.
    #[error("Record not found: {0}")]
    NotFound(Key),

    /// An optimistic transaction lost a race with another writer.
    #[error("Transaction conflict on {0}")]
    Conflict(Key),

    /// A document could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A stored document is not a JSON object.
    #[error("Malformed document for {0}")]
    MalformedDocument(Key),

    /// The backing store is unavailable.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for ConvoError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => {
                ConvoError::NotFound(format!("{} {} was not found", key.kind(), key))
            }
            other => ConvoError::Internal(other.to_string()),
        }
    }
}
