//! Replication coordinator for the Digital Object Repository.
//!
//! After a commit, the fast store and search index must catch up with the
//! object store. Every propagation is bracketed by a durable job row so that
//! a crash between the commit and the propagation can be repaired later.
//!
//! # Key Types
//!
//! - [`ReplicationCoordinator`] -- upsert job, push to both targets, dequeue
//! - [`JobTable`] -- durable `{pid, action}` rows ([`InMemoryJobTable`], [`WalJobTable`])
//! - [`AuthoritativeSource`] -- definitive re-read before a modify is pushed

pub mod coordinator;
pub mod error;
pub mod job;
pub mod wal;

pub use coordinator::{AuthoritativeSource, RecoveryReport, ReplicationCoordinator};
pub use error::{ReplicationError, Result};
pub use job::{InMemoryJobTable, JobAction, JobTable, ReplicationJob};
pub use wal::WalJobTable;
