use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

use dor_types::Pid;

use crate::error::{RepositoryError, RepositoryResult};

/// Per-pid exclusive writer locks.
///
/// Acquisition never blocks: a pid that is already held is reported as
/// [`RepositoryError::ObjectLocked`].
#[derive(Clone, Debug, Default)]
pub struct WriterLocks {
    held: Arc<Mutex<HashSet<Pid>>>,
}

impl WriterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, pid: &Pid) -> RepositoryResult<WriterGuard> {
        let mut held = self
            .held
            .lock()
            .map_err(|e| RepositoryError::StorageDevice(format!("lock poisoned: {e}")))?;
        if !held.insert(pid.clone()) {
            return Err(RepositoryError::ObjectLocked(pid.clone()));
        }
        debug!(%pid, "writer lock acquired");
        Ok(WriterGuard {
            held: Arc::clone(&self.held),
            pid: pid.clone(),
        })
    }

    pub fn is_locked(&self, pid: &Pid) -> bool {
        self.held.lock().map(|h| h.contains(pid)).unwrap_or(false)
    }
}

/// Holds one pid's writer lock until dropped.
#[derive(Debug)]
pub struct WriterGuard {
    held: Arc<Mutex<HashSet<Pid>>>,
    pid: Pid,
}

impl WriterGuard {
    pub fn pid(&self) -> &Pid {
        &self.pid
    }
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.pid);
        debug!(pid = %self.pid, "writer lock released");
    }
}
