//! Error types for the auxiliary stores.

use dor_types::Pid;

/// Errors raised by the fast store, search index, and resource index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The object has no entry in this store.
    #[error("object not indexed: {0}")]
    NotFound(Pid),

    /// The object already has an entry in this store.
    #[error("object already indexed: {0}")]
    AlreadyIndexed(Pid),

    /// A search session token is unknown or already consumed.
    #[error("unknown search session: {0}")]
    UnknownSession(String),

    /// A query named a field the index does not carry.
    #[error("unknown search field: {0}")]
    UnknownField(String),

    /// A datastream the projection reads could not be interpreted.
    #[error("projection error: {0}")]
    Codec(#[from] dor_codec::CodecError),

    /// The backing store failed.
    #[error("index backend error: {0}")]
    Backend(String),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;

pub(crate) fn poisoned<E: std::fmt::Display>(e: E) -> IndexError {
    IndexError::Backend(format!("lock poisoned: {e}"))
}
