//! In-memory registry for tests and ephemeral use.
//!
//! [`InMemoryRegistry`] stores all rows in a `HashMap` protected by a
//! `RwLock`. Data is lost when the registry is dropped; a durable repository
//! rebuilds it from the object store on startup.

use std::collections::HashMap;
use std::sync::RwLock;

use dor_types::Pid;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::traits::Registry;
use crate::types::RegistryEntry;

/// An in-memory implementation of [`Registry`].
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    rows: RwLock<HashMap<Pid, RegistryEntry>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> RegistryError {
    RegistryError::Backend(format!("lock poisoned: {e}"))
}

impl Registry for InMemoryRegistry {
    fn exists(&self, pid: &Pid) -> Result<bool> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows.contains_key(pid))
    }

    fn register(&self, entry: RegistryEntry) -> Result<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        if rows.contains_key(&entry.pid) {
            return Err(RegistryError::AlreadyExists { pid: entry.pid });
        }
        debug!(pid = %entry.pid, kind = %entry.kind_code(), "registered object");
        rows.insert(entry.pid.clone(), entry);
        Ok(())
    }

    fn unregister(&self, pid: &Pid) -> Result<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        rows.remove(pid)
            .map(|_| debug!(%pid, "unregistered object"))
            .ok_or_else(|| RegistryError::NotFound { pid: pid.clone() })
    }

    fn get(&self, pid: &Pid) -> Result<Option<RegistryEntry>> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows.get(pid).cloned())
    }

    fn update(&self, entry: &RegistryEntry) -> Result<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        let row = rows
            .get_mut(&entry.pid)
            .ok_or_else(|| RegistryError::NotFound {
                pid: entry.pid.clone(),
            })?;
        row.label = entry.label.clone();
        row.content_model = entry.content_model.clone();
        Ok(())
    }

    fn increment_system_version(&self, pid: &Pid) -> Result<u64> {
        // Read, then write under a separate guard: the registry offers no
        // row lock, the pid's writer lock is what serializes this.
        let current = self.system_version(pid)?;
        let next = current + 1;
        let mut rows = self.rows.write().map_err(poisoned)?;
        let row = rows
            .get_mut(pid)
            .ok_or_else(|| RegistryError::NotFound { pid: pid.clone() })?;
        row.system_version = next;
        Ok(next)
    }

    fn list(&self) -> Result<Vec<Pid>> {
        let rows = self.rows.read().map_err(poisoned)?;
        let mut pids: Vec<Pid> = rows.keys().cloned().collect();
        pids.sort();
        Ok(pids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dor_types::ObjectKind;

    fn entry(pid: &str) -> RegistryEntry {
        RegistryEntry {
            pid: Pid::parse(pid).unwrap(),
            kind: ObjectKind::DataObject,
            owner: "fedoraAdmin".into(),
            label: "label".into(),
            content_model: None,
            system_version: 0,
        }
    }

    #[test]
    fn register_and_exists() {
        let reg = InMemoryRegistry::new();
        let pid = Pid::parse("demo:1").unwrap();
        assert!(!reg.exists(&pid).unwrap());
        reg.register(entry("demo:1")).unwrap();
        assert!(reg.exists(&pid).unwrap());
        assert_eq!(reg.get_owner(&pid).unwrap(), "fedoraAdmin");
    }

    #[test]
    fn double_register_fails() {
        let reg = InMemoryRegistry::new();
        reg.register(entry("demo:1")).unwrap();
        let err = reg.register(entry("demo:1")).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists { .. }));
    }

    #[test]
    fn unregister_missing_fails() {
        let reg = InMemoryRegistry::new();
        let err = reg.unregister(&Pid::parse("demo:9").unwrap()).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[test]
    fn system_version_increments() {
        let reg = InMemoryRegistry::new();
        let pid = Pid::parse("demo:1").unwrap();
        reg.register(entry("demo:1")).unwrap();
        assert_eq!(reg.increment_system_version(&pid).unwrap(), 1);
        assert_eq!(reg.increment_system_version(&pid).unwrap(), 2);
        assert_eq!(reg.system_version(&pid).unwrap(), 2);
    }

    #[test]
    fn update_changes_label_only() {
        let reg = InMemoryRegistry::new();
        let pid = Pid::parse("demo:1").unwrap();
        reg.register(entry("demo:1")).unwrap();
        reg.increment_system_version(&pid).unwrap();

        let mut changed = entry("demo:1");
        changed.label = "new label".into();
        reg.update(&changed).unwrap();

        let row = reg.get(&pid).unwrap().unwrap();
        assert_eq!(row.label, "new label");
        assert_eq!(row.system_version, 1);
    }

    #[test]
    fn list_is_sorted() {
        let reg = InMemoryRegistry::new();
        reg.register(entry("demo:2")).unwrap();
        reg.register(entry("demo:10")).unwrap();
        reg.register(entry("a:1")).unwrap();
        let listed: Vec<String> = reg.list().unwrap().into_iter().map(String::from).collect();
        assert_eq!(listed, vec!["a:1", "demo:10", "demo:2"]);
    }
}
