use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid pid '{pid}': {reason}")]
    InvalidPid { pid: String, reason: String },

    #[error("invalid {kind} code: {code}")]
    InvalidCode { kind: &'static str, code: String },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("version {version_id} of {component} is older than the latest version")]
    VersionOrder { component: String, version_id: String },

    #[error("duplicate version id {version_id} for {component}")]
    DuplicateVersion { component: String, version_id: String },
}
