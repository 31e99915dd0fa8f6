/// Errors from content store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested id is not in the store.
    #[error("content not found: {0}")]
    NotFound(String),

    /// `add` was called for an id that already exists.
    #[error("content already exists: {0}")]
    AlreadyExists(String),

    /// The id cannot be used as a key by this backend.
    #[error("invalid content id: {0}")]
    InvalidId(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fetching external content failed.
    #[error("fetch of {url} failed: {message}")]
    Fetch { url: String, message: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
