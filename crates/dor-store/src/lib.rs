//! Low-level content storage for the Digital Object Repository.
//!
//! A content store is a flat id-to-bytes map with strict create/update
//! semantics. The repository keeps three independent instances:
//!
//! - the **object store** holding serialized object documents,
//! - the **datastream store** holding managed content bytes,
//! - the **staging store** holding uploads until a commit moves them.
//!
//! # Storage Backends
//!
//! All backends implement the [`ContentStore`] trait:
//!
//! - [`InMemoryContentStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileContentStore`] -- one file per id under a root directory
//!
//! # Design Rules
//!
//! 1. `add` never overwrites; `replace` never creates.
//! 2. The store never interprets content -- it is a pure key-value store.
//! 3. All I/O errors are propagated, never silently ignored.
//!
//! External content referenced by URL is read through a [`ContentFetcher`].

pub mod error;
pub mod fetch;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fetch::{ContentFetcher, FetchedContent, HttpContentFetcher, InMemoryContentFetcher};
pub use file::FileContentStore;
pub use memory::InMemoryContentStore;
pub use traits::ContentStore;
