//! The [`Registry`] trait defining the catalog interface.

use dor_types::Pid;

use crate::error::{RegistryError, Result};
use crate::types::RegistryEntry;

/// Authoritative catalog of existing objects.
///
/// Implementations must be thread-safe (`Send + Sync`). No row-level lock
/// is provided: [`Registry::increment_system_version`] is a plain
/// read-increment-write and callers must hold the pid's writer lock.
pub trait Registry: Send + Sync {
    /// Whether a row exists for `pid`.
    fn exists(&self, pid: &Pid) -> Result<bool>;

    /// Insert a row. Fails with `AlreadyExists` if the pid is registered.
    fn register(&self, entry: RegistryEntry) -> Result<()>;

    /// Delete the row for `pid`. Fails with `NotFound` if absent.
    fn unregister(&self, pid: &Pid) -> Result<()>;

    /// Read the row for `pid`.
    fn get(&self, pid: &Pid) -> Result<Option<RegistryEntry>>;

    /// Overwrite label and content model of an existing row.
    fn update(&self, entry: &RegistryEntry) -> Result<()>;

    /// Read the current system version, add one, write it back, and return
    /// the new value.
    fn increment_system_version(&self, pid: &Pid) -> Result<u64>;

    /// All registered pids, sorted.
    fn list(&self) -> Result<Vec<Pid>>;

    /// The owner recorded for `pid`.
    fn get_owner(&self, pid: &Pid) -> Result<String> {
        self.get(pid)?
            .map(|e| e.owner)
            .ok_or_else(|| RegistryError::NotFound { pid: pid.clone() })
    }

    /// The system version recorded for `pid`.
    fn system_version(&self, pid: &Pid) -> Result<u64> {
        self.get(pid)?
            .map(|e| e.system_version)
            .ok_or_else(|| RegistryError::NotFound { pid: pid.clone() })
    }
}
