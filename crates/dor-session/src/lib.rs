//! Session layer of the Digital Object Repository.
//!
//! Hands out readers and exclusive writers, runs documents through the
//! ingest pipeline, and commits changes to the object store, registry,
//! resource index and (through the replication coordinator) the fast store
//! and search index.
//!
//! # Key Types
//!
//! - [`SessionManager`] -- the entry point: readers, writers, ingest, commit
//! - [`Reader`] -- read access routed by [`ReaderTier`] between fast and definitive stores
//! - [`ObjectWriter`] -- exclusive, versioned editing of one object
//! - [`IngestPipeline`] -- the staged ingest of a serialized object
//! - [`RepositoryContext`] -- handles to every store and index a session uses
//! - [`RepositoryConfig`] -- TOML-loadable repository settings
//! - [`RepositoryError`] -- the repository error taxonomy

pub mod config;
pub mod context;
pub mod definitive;
pub mod error;
pub mod ingest;
pub mod locks;
pub mod manager;
pub mod reader;
pub mod writer;

pub use config::{CacheConfig, RepositoryConfig};
pub use context::RepositoryContext;
pub use definitive::{snapshot_as_of, DefinitiveStore};
pub use error::{RepositoryError, RepositoryResult};
pub use ingest::{IngestJob, IngestOutcome, IngestPipeline, IngestStage, IngestState, StageTiming};
pub use locks::{WriterGuard, WriterLocks};
pub use manager::SessionManager;
pub use reader::{ObjectProfile, Reader, ReaderTier};
pub use writer::{DatastreamContent, DatastreamUpdate, ObjectWriter};
