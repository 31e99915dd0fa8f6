//! The definitive tier: objects read back from their serialized documents.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use dor_codec::{MetsDeserializer, MetsSerializer};
use dor_replication::{AuthoritativeSource, ReplicationError};
use dor_store::ContentStore;
use dor_types::{DigitalObject, Pid, Timestamp};

use crate::error::{RepositoryError, RepositoryResult};

pub(crate) const ENCODING: &str = "UTF-8";

/// Loads committed objects from the object store through the codec.
pub struct DefinitiveStore {
    objects: Arc<dyn ContentStore>,
    loads: AtomicU64,
}

impl DefinitiveStore {
    pub fn new(objects: Arc<dyn ContentStore>) -> Self {
        Self {
            objects,
            loads: AtomicU64::new(0),
        }
    }

    /// How many documents have been parsed so far.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn exists(&self, pid: &Pid) -> RepositoryResult<bool> {
        Ok(self.objects.exists(pid.as_str())?)
    }

    pub fn load(&self, pid: &Pid) -> RepositoryResult<DigitalObject> {
        let bytes = self.objects.retrieve(pid.as_str()).map_err(|e| {
            if e.is_not_found() {
                RepositoryError::not_found(pid)
            } else {
                e.into()
            }
        })?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        let object = MetsDeserializer::new(ENCODING)?.deserialize_bytes(&bytes)?;
        debug!(%pid, bytes = bytes.len(), "loaded definitive object");
        Ok(object)
    }

    /// The serialized document of `pid` as it stood at `as_of`, or as
    /// stored when `as_of` is `None`.
    pub fn export(&self, pid: &Pid, as_of: Option<&Timestamp>) -> RepositoryResult<Vec<u8>> {
        match as_of {
            None => {
                let bytes = self.objects.retrieve(pid.as_str()).map_err(|e| {
                    if e.is_not_found() {
                        RepositoryError::not_found(pid)
                    } else {
                        e.into()
                    }
                })?;
                Ok(bytes.to_vec())
            }
            Some(at) => {
                let object = snapshot_as_of(&self.load(pid)?, at);
                Ok(MetsSerializer::new(ENCODING)?.to_bytes(&object)?)
            }
        }
    }
}

impl std::fmt::Debug for DefinitiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitiveStore")
            .field("loads", &self.loads())
            .finish_non_exhaustive()
    }
}

impl AuthoritativeSource for DefinitiveStore {
    fn load(&self, pid: &Pid) -> Result<DigitalObject, ReplicationError> {
        DefinitiveStore::load(self, pid).map_err(|e| ReplicationError::Source {
            pid: pid.clone(),
            reason: e.to_string(),
        })
    }
}

/// A copy of `object` holding only the versions and audit records that
/// existed at `as_of`. Versions without a create date are kept.
pub fn snapshot_as_of(object: &DigitalObject, as_of: &Timestamp) -> DigitalObject {
    let existed = |created: Option<&Timestamp>| created.map_or(true, |c| c <= as_of);
    let mut snapshot = object.clone();
    for versions in snapshot.datastreams.values_mut() {
        versions.retain(|d| existed(d.created.as_ref()));
    }
    snapshot.datastreams.retain(|_, v| !v.is_empty());
    for versions in snapshot.disseminators.values_mut() {
        versions.retain(|d| existed(d.created.as_ref()));
    }
    snapshot.disseminators.retain(|_, v| !v.is_empty());
    snapshot.audit_records.retain(|a| &a.date <= as_of);
    snapshot
}
