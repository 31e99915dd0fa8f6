use std::io;

use dor_index::IndexError;
use dor_types::Pid;

/// Errors produced while recording or propagating replication jobs.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// I/O error on the job log.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A job record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The fast store or search index rejected an update.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// The definitive copy of an object could not be read.
    #[error("cannot load {pid} from the object store: {reason}")]
    Source { pid: Pid, reason: String },

    /// A lock or other backend resource failed.
    #[error("job table backend error: {0}")]
    Backend(String),
}

/// Convenience alias used throughout the replication crate.
pub type Result<T> = std::result::Result<T, ReplicationError>;

pub(crate) fn poisoned<E: std::fmt::Display>(e: E) -> ReplicationError {
    ReplicationError::Backend(format!("lock poisoned: {e}"))
}
