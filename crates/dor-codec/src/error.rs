use std::io;

/// Errors produced by the document codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The document is malformed or violates the object model.
    #[error("object integrity error: {0}")]
    ObjectIntegrity(String),

    /// Reading or writing the underlying stream failed.
    #[error("stream I/O error: {0}")]
    StreamIo(#[from] io::Error),

    /// The declared character encoding is not supported.
    #[error("unsupported character encoding: {0}")]
    UnsupportedEncoding(String),

    /// The declared document format is not supported.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// Staging inline content or fetching external content failed.
    #[error("content error: {0}")]
    Content(#[from] dor_store::StoreError),
}

impl CodecError {
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::ObjectIntegrity(message.into())
    }
}

impl From<quick_xml::Error> for CodecError {
    fn from(e: quick_xml::Error) -> Self {
        match e {
            quick_xml::Error::Io(inner) => Self::StreamIo(io::Error::new(inner.kind(), inner.to_string())),
            other => Self::ObjectIntegrity(format!("malformed XML: {other}")),
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for CodecError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::ObjectIntegrity(format!("malformed attribute: {e}"))
    }
}

impl From<dor_types::TypeError> for CodecError {
    fn from(e: dor_types::TypeError) -> Self {
        Self::ObjectIntegrity(e.to_string())
    }
}

/// Convenience alias used throughout the codec crate.
pub type Result<T> = std::result::Result<T, CodecError>;
