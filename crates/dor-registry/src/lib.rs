//! Object registry for the Digital Object Repository.
//!
//! The registry is the authoritative catalog of which objects exist. Every
//! committed object has exactly one row; a pid without a row does not exist
//! no matter what the content stores hold.
//!
//! # Architecture
//!
//! - **Rows** ([`RegistryEntry`]) carry the pid, kind code, owner, label,
//!   content model, and a monotonically increasing system version.
//! - **System versions** are bumped with a read-increment-write that is only
//!   correct while the caller holds the pid's writer lock.
//! - **Pid generation** ([`PidGenerator`]) hands out `namespace:N` pids and
//!   never re-issues a pid that was retained by a caller.
//!
//! # Modules
//!
//! - [`error`] -- Error types for registry operations
//! - [`types`] -- The [`RegistryEntry`] row type
//! - [`traits`] -- The [`Registry`] trait defining the catalog interface
//! - [`memory`] -- In-memory [`InMemoryRegistry`]
//! - [`pid_gen`] -- [`PidGenerator`] and [`InMemoryPidGenerator`]

pub mod error;
pub mod memory;
pub mod pid_gen;
pub mod traits;
pub mod types;

pub use error::{RegistryError, Result};
pub use memory::InMemoryRegistry;
pub use pid_gen::{InMemoryPidGenerator, PidGenerator};
pub use traits::Registry;
pub use types::RegistryEntry;
