use pressline_core::error::CoreError;

/// Errors raised by artifact store backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    /// Transport failure talking to the backing store.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid storage URI: {0}")]
    InvalidUri(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Io(_))
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(uri) => CoreError::Internal(format!("Artifact blob missing: {uri}")),
            StorageError::InvalidUri(uri) => CoreError::Validation(format!("Invalid storage URI: {uri}")),
            other => CoreError::StorageUnavailable(other.to_string()),
        }
    }
}
