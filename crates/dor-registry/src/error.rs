//! Error types for registry operations.

use dor_types::Pid;
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No row exists for the pid.
    #[error("object not registered: {pid}")]
    NotFound { pid: Pid },

    /// A row already exists for the pid.
    #[error("object already registered: {pid}")]
    AlreadyExists { pid: Pid },

    /// The requested namespace or count cannot be used for pid generation.
    #[error("cannot generate pids: {0}")]
    Generation(String),

    /// The backing catalog failed.
    #[error("registry backend failure: {0}")]
    Backend(String),
}

/// Convenience type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
