//! Pid generation.
//!
//! Generated pids have the shape `namespace:N` with `N` a decimal counter
//! per namespace. Retained pids (supplied by a caller and kept as-is) push
//! the counter past their number so they are never generated later.

use std::collections::HashMap;
use std::sync::Mutex;

use dor_types::Pid;
use tracing::debug;

use crate::error::{RegistryError, Result};

/// Source of fresh pids.
pub trait PidGenerator: Send + Sync {
    /// Generate `count` pids in `namespace` that were never handed out.
    fn next_pids(&self, count: usize, namespace: &str) -> Result<Vec<Pid>>;

    /// Record a pid chosen by a caller so it is never generated.
    fn retain(&self, pid: &Pid) -> Result<()>;

    /// Generate a single pid.
    fn next_pid(&self, namespace: &str) -> Result<Pid> {
        self.next_pids(1, namespace)?
            .pop()
            .ok_or_else(|| RegistryError::Generation("no pid generated".into()))
    }
}

/// Counter-per-namespace generator held in memory.
#[derive(Debug, Default)]
pub struct InMemoryPidGenerator {
    highest: Mutex<HashMap<String, u64>>,
}

impl InMemoryPidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest number generated or retained so far in `namespace`.
    pub fn highest(&self, namespace: &str) -> u64 {
        self.highest
            .lock()
            .map(|h| h.get(namespace).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl PidGenerator for InMemoryPidGenerator {
    fn next_pids(&self, count: usize, namespace: &str) -> Result<Vec<Pid>> {
        if count == 0 {
            return Err(RegistryError::Generation("count must be at least 1".into()));
        }
        let mut highest = self
            .highest
            .lock()
            .map_err(|e| RegistryError::Backend(format!("lock poisoned: {e}")))?;
        let counter = highest.entry(namespace.to_string()).or_insert(0);

        let mut pids = Vec::with_capacity(count);
        for _ in 0..count {
            *counter += 1;
            let pid = Pid::from_parts(namespace, &counter.to_string())
                .map_err(|e| RegistryError::Generation(e.to_string()))?;
            pids.push(pid);
        }
        debug!(namespace, count, last = *counter, "generated pids");
        Ok(pids)
    }

    fn retain(&self, pid: &Pid) -> Result<()> {
        // Only numeric ids can collide with generated ones.
        let Ok(n) = pid.object_id().parse::<u64>() else {
            return Ok(());
        };
        let mut highest = self
            .highest
            .lock()
            .map_err(|e| RegistryError::Backend(format!("lock poisoned: {e}")))?;
        let counter = highest.entry(pid.namespace().to_string()).or_insert(0);
        if n > *counter {
            *counter = n;
        }
        Ok(())
    }
}
