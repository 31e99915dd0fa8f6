use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;

use crate::error::{StoreError, StoreResult};
use crate::traits::ContentStore;

/// In-memory, HashMap-based content store.
///
/// Intended for tests and embedding. Content is held behind a `RwLock`;
/// `Bytes` makes reads cheap clones.
pub struct InMemoryContentStore {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of ids currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored entries.
    pub fn total_bytes(&self) -> u64 {
        self.entries
            .read()
            .expect("lock poisoned")
            .values()
            .map(|b| b.len() as u64)
            .sum()
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore for InMemoryContentStore {
    fn add(&self, id: &str, content: &[u8]) -> StoreResult<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        if map.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        map.insert(id.to_string(), Bytes::copy_from_slice(content));
        Ok(())
    }

    fn replace(&self, id: &str, content: &[u8]) -> StoreResult<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        match map.get_mut(id) {
            Some(slot) => {
                *slot = Bytes::copy_from_slice(content);
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn retrieve(&self, id: &str) -> StoreResult<Bytes> {
        let map = self.entries.read().expect("lock poisoned");
        map.get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn remove(&self, id: &str) -> StoreResult<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        map.remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn exists(&self, id: &str) -> StoreResult<bool> {
        Ok(self.entries.read().expect("lock poisoned").contains_key(id))
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        let map = self.entries.read().expect("lock poisoned");
        let mut ids: Vec<String> = map.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for InMemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContentStore")
            .field("entry_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_retrieve() {
        let store = InMemoryContentStore::new();
        store.add("a", b"hello").unwrap();
        assert_eq!(&store.retrieve("a").unwrap()[..], b"hello");
        assert_eq!(store.len(), 1);
        assert_eq!(store.total_bytes(), 5);
    }

    #[test]
    fn add_refuses_existing() {
        let store = InMemoryContentStore::new();
        store.add("a", b"1").unwrap();
        let err = store.add("a", b"2").unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(&store.retrieve("a").unwrap()[..], b"1");
    }

    #[test]
    fn replace_requires_existing() {
        let store = InMemoryContentStore::new();
        assert!(store.replace("a", b"x").unwrap_err().is_not_found());
        store.add("a", b"1").unwrap();
        store.replace("a", b"2").unwrap();
        assert_eq!(&store.retrieve("a").unwrap()[..], b"2");
    }

    #[test]
    fn remove_and_missing() {
        let store = InMemoryContentStore::new();
        store.add("a", b"1").unwrap();
        store.remove("a").unwrap();
        assert!(!store.exists("a").unwrap());
        assert!(store.remove("a").unwrap_err().is_not_found());
        assert!(store.retrieve("a").unwrap_err().is_not_found());
    }

    #[test]
    fn put_creates_then_replaces() {
        let store = InMemoryContentStore::new();
        store.put("a", b"1").unwrap();
        store.put("a", b"2").unwrap();
        assert_eq!(&store.retrieve("a").unwrap()[..], b"2");
    }

    #[test]
    fn list_is_sorted() {
        let store = InMemoryContentStore::new();
        store.add("b", b"").unwrap();
        store.add("a", b"").unwrap();
        assert_eq!(store.list().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }
}
