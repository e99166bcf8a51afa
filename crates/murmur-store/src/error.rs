use thiserror::Error;

use murmur_shared::SyncError;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The read or write could not be carried out (I/O, permission, outage).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A path or key contained characters the store does not accept.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A value could not be converted into store fields.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Store(e.to_string())
    }
}
