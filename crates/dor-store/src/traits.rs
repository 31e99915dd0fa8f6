use bytes::Bytes;

use crate::error::StoreResult;

/// Id-keyed blob store.
///
/// All implementations must satisfy these invariants:
/// - `add` fails with `AlreadyExists` if the id is present.
/// - `replace` and `remove` fail with `NotFound` if the id is absent.
/// - Concurrent calls on distinct ids are always safe.
/// - All I/O errors are propagated, never silently ignored.
pub trait ContentStore: Send + Sync {
    /// Store bytes under a new id.
    fn add(&self, id: &str, content: &[u8]) -> StoreResult<()>;

    /// Overwrite the bytes of an existing id.
    fn replace(&self, id: &str, content: &[u8]) -> StoreResult<()>;

    /// Read the bytes stored under `id`.
    fn retrieve(&self, id: &str) -> StoreResult<Bytes>;

    /// Delete the bytes stored under `id`.
    fn remove(&self, id: &str) -> StoreResult<()>;

    /// Check whether `id` is present.
    fn exists(&self, id: &str) -> StoreResult<bool>;

    /// All ids in the store, sorted.
    fn list(&self) -> StoreResult<Vec<String>>;

    /// `add` if absent, `replace` otherwise.
    ///
    /// Default implementation is check-then-act; callers serialize writes
    /// per id through their own locking.
    fn put(&self, id: &str, content: &[u8]) -> StoreResult<()> {
        if self.exists(id)? {
            self.replace(id, content)
        } else {
            self.add(id, content)
        }
    }
}
