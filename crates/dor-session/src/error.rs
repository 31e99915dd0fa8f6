//! The repository error taxonomy and conversions from lower layers.

use dor_codec::CodecError;
use dor_index::IndexError;
use dor_registry::RegistryError;
use dor_replication::ReplicationError;
use dor_store::StoreError;
use dor_types::{Pid, TypeError};

/// Errors surfaced by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("object already exists: {0}")]
    ObjectExists(Pid),

    /// Deleting the object would leave other objects' disseminators dangling.
    #[error("{pid} is still used by {dependents} disseminator(s) of other objects")]
    ObjectDependency { pid: Pid, dependents: usize },

    /// Another writer holds the object.
    #[error("object is locked by another writer: {0}")]
    ObjectLocked(Pid),

    #[error("invalid user parameter: {0}")]
    InvalidUserParm(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("object integrity error: {0}")]
    ObjectIntegrity(String),

    #[error("stream I/O error: {0}")]
    StreamIo(String),

    /// A content store, registry, or index failed.
    #[error("storage device error: {0}")]
    StorageDevice(String),

    /// Anything else, keeping the underlying error's type name.
    #[error("{kind}: {message}")]
    GeneralException { kind: String, message: String },
}

impl RepositoryError {
    /// Wrap an arbitrary error, recording its type name.
    pub fn general<E: std::error::Error>(e: &E) -> Self {
        let full = std::any::type_name::<E>();
        Self::GeneralException {
            kind: full.rsplit("::").next().unwrap_or(full).to_string(),
            message: e.to_string(),
        }
    }

    pub fn not_found(pid: &Pid) -> Self {
        Self::ObjectNotFound(pid.to_string())
    }
}

/// Convenience alias used throughout the session crate.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<CodecError> for RepositoryError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::ObjectIntegrity(m) => Self::ObjectIntegrity(m),
            CodecError::StreamIo(io) => Self::StreamIo(io.to_string()),
            CodecError::Content(store) => store.into(),
            other => Self::general(&other),
        }
    }
}

impl From<StoreError> for RepositoryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Fetch { .. } => Self::general(&e),
            other => Self::StorageDevice(other.to_string()),
        }
    }
}

impl From<RegistryError> for RepositoryError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound { pid } => Self::ObjectNotFound(pid.to_string()),
            RegistryError::AlreadyExists { pid } => Self::ObjectExists(pid),
            other => Self::StorageDevice(other.to_string()),
        }
    }
}

impl From<IndexError> for RepositoryError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Codec(codec) => codec.into(),
            IndexError::UnknownField(_) | IndexError::UnknownSession(_) => Self::general(&e),
            other => Self::StorageDevice(other.to_string()),
        }
    }
}

impl From<ReplicationError> for RepositoryError {
    fn from(e: ReplicationError) -> Self {
        match e {
            ReplicationError::Index(index) => index.into(),
            other => Self::StorageDevice(other.to_string()),
        }
    }
}

impl From<TypeError> for RepositoryError {
    fn from(e: TypeError) -> Self {
        Self::ObjectIntegrity(e.to_string())
    }
}

impl From<toml::de::Error> for RepositoryError {
    fn from(e: toml::de::Error) -> Self {
        Self::general(&e)
    }
}
