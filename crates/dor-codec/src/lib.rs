//! Structural document codec for the Digital Object Repository.
//!
//! Converts between [`dor_types::DigitalObject`] and its durable METS form,
//! and reads the XML datastreams the repository itself interprets.
//!
//! # Key Types
//!
//! - [`MetsDeserializer`] -- single-pass pull parser building an object graph
//! - [`MetsSerializer`] -- deterministic writer, the inverse of the parser
//! - [`validate`] -- structural check used before ingest and after serialization
//! - [`MethodMap`] -- `METHODMAP` parsing into behavior and mechanism specs
//! - [`DcRecord`] / [`Relationships`] -- `DC` and `RELS-EXT` readers
//!
//! # Design Rules
//!
//! 1. Inline XML metadata is never reparsed into a tree; its bytes are
//!    re-emitted exactly as read.
//! 2. Every reference inside a document must resolve once the document ends.
//! 3. Only UTF-8 documents are accepted.

pub mod dc;
pub mod deserializer;
pub mod error;
pub mod escape;
pub mod format;
pub mod methodmap;
pub mod rels;
pub mod serializer;
pub mod state;
pub mod validate;

#[cfg(test)]
pub(crate) mod fixtures;

pub use dc::{default_dc, ensure_identifier, DcRecord};
pub use deserializer::{ExternalQuery, MetsDeserializer};
pub use error::{CodecError, Result};
pub use escape::{url_encode, xml_escape};
pub use format::{check_encoding, DocumentFormat};
pub use methodmap::{MappedMethod, MethodMap};
pub use rels::Relationships;
pub use serializer::MetsSerializer;
pub use validate::validate;
