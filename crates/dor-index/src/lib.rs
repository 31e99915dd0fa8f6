//! Auxiliary stores for the Digital Object Repository.
//!
//! The object store holds the durable truth; everything here is derived
//! from committed objects and can be rebuilt from them.
//!
//! # Key Types
//!
//! - [`FastStore`] -- denormalized projection answering unversioned reads
//! - [`SearchIndex`] -- field search with paged result sessions
//! - [`ResourceIndex`] -- object graph statements, including `RELS-EXT`
//! - [`InMemoryFastStore`], [`InMemorySearchIndex`], [`InMemoryResourceIndex`]
//!   -- in-process implementations of the three contracts

pub mod error;
pub mod fast;
pub mod resource;
pub mod search;

pub use error::{IndexError, IndexResult};
pub use fast::{Dependency, FastStore, InMemoryFastStore, ObjectRow, Projection};
pub use resource::{object_triples, InMemoryResourceIndex, ResourceIndex};
pub use search::{
    glob_match, Condition, FieldQuery, FindObjectsResult, InMemorySearchIndex, ObjectFields,
    Operator, SearchIndex,
};
