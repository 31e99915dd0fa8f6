//! Read access to one object, routed between the fast and definitive tiers.
//!
//! A reader remembers where its object was found when it was opened. While
//! that was the fast store, unversioned questions are answered there; any
//! question carrying an as-of date, and every question on a reader whose
//! object was only found in the object store, goes to the definitive copy,
//! which is parsed at most once per reader.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::debug;

use dor_codec::MethodMap;
use dor_index::FastStore;
use dor_store::{ContentFetcher, ContentStore};
use dor_types::datastream::LocationKind;
use dor_types::object::METHOD_MAP_DATASTREAM_ID;
use dor_types::{
    BehaviorSpec, ControlGroup, Datastream, DigitalObject, Disseminator, MechanismSpec, MethodDef,
    ObjectKind, ObjectState, Pid, Timestamp,
};

use crate::definitive::DefinitiveStore;
use crate::error::{RepositoryError, RepositoryResult};

/// Which store answers a reader's unversioned questions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReaderTier {
    /// The denormalized fast store.
    Fast,
    /// The parsed object document.
    Definitive,
}

/// Header fields of an object, whichever tier they came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectProfile {
    pub pid: Pid,
    pub label: String,
    pub kind: ObjectKind,
    pub state: ObjectState,
    pub content_model: Option<String>,
    pub created: Option<Timestamp>,
    pub last_modified: Option<Timestamp>,
}

impl ObjectProfile {
    fn of(object: &DigitalObject) -> Self {
        Self {
            pid: object.pid.clone(),
            label: object.label.clone(),
            kind: object.kind,
            state: object.effective_state(),
            content_model: object.content_model.clone(),
            created: object.created,
            last_modified: object.last_modified,
        }
    }
}

/// Where a reader gets datastream bytes from.
pub(crate) struct ContentSources {
    pub datastreams: Arc<dyn ContentStore>,
    pub fetcher: Arc<dyn ContentFetcher>,
}

/// Read-only view of one object.
pub struct Reader {
    pid: Pid,
    tier: ReaderTier,
    fast: Arc<dyn FastStore>,
    definitive_store: Arc<DefinitiveStore>,
    sources: Arc<ContentSources>,
    definitive: Mutex<Option<Arc<DigitalObject>>>,
}

impl Reader {
    pub(crate) fn new(
        pid: Pid,
        tier: ReaderTier,
        fast: Arc<dyn FastStore>,
        definitive_store: Arc<DefinitiveStore>,
        sources: Arc<ContentSources>,
    ) -> Self {
        Self {
            pid,
            tier,
            fast,
            definitive_store,
            sources,
            definitive: Mutex::new(None),
        }
    }

    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    /// Tier the object was found in when the reader was opened.
    pub fn tier(&self) -> ReaderTier {
        self.tier
    }

    fn fast_path(&self, as_of: Option<&Timestamp>) -> bool {
        self.tier == ReaderTier::Fast && as_of.is_none()
    }

    /// The parsed object document, loaded on first use.
    pub fn object(&self) -> RepositoryResult<Arc<DigitalObject>> {
        let mut slot = self
            .definitive
            .lock()
            .map_err(|e| RepositoryError::StorageDevice(format!("lock poisoned: {e}")))?;
        if let Some(object) = slot.as_ref() {
            return Ok(Arc::clone(object));
        }
        debug!(pid = %self.pid, "reader falling back to definitive copy");
        let object = Arc::new(self.definitive_store.load(&self.pid)?);
        *slot = Some(Arc::clone(&object));
        Ok(object)
    }

    // ---- Object header ----

    pub fn profile(&self) -> RepositoryResult<ObjectProfile> {
        if self.fast_path(None) {
            if let Some(row) = self.fast.object_row(&self.pid)? {
                return Ok(ObjectProfile {
                    pid: row.pid,
                    label: row.label,
                    kind: row.kind,
                    state: row.state,
                    content_model: row.content_model,
                    created: row.created,
                    last_modified: row.last_modified,
                });
            }
        }
        Ok(ObjectProfile::of(&*self.object()?))
    }

    pub fn kind(&self) -> RepositoryResult<ObjectKind> {
        Ok(self.profile()?.kind)
    }

    // ---- Datastreams ----

    /// Datastream `id` as of `as_of` (current version when `None`).
    pub fn datastream(&self, id: &str, as_of: Option<&Timestamp>) -> RepositoryResult<Datastream> {
        let found = if self.fast_path(as_of) {
            self.fast.datastream(&self.pid, id)?
        } else {
            self.object()?.datastream_as_of(id, as_of).cloned()
        };
        found.ok_or_else(|| {
            RepositoryError::ObjectNotFound(format!("datastream {id} of {}", self.pid))
        })
    }

    pub fn datastreams(&self, as_of: Option<&Timestamp>) -> RepositoryResult<Vec<Datastream>> {
        if self.fast_path(as_of) {
            return Ok(self.fast.datastreams(&self.pid)?);
        }
        let object = self.object()?;
        Ok(object
            .datastream_ids()
            .filter_map(|id| object.datastream_as_of(id, as_of).cloned())
            .collect())
    }

    /// Every version of datastream `id`, oldest first. Always definitive.
    pub fn datastream_history(&self, id: &str) -> RepositoryResult<Vec<Datastream>> {
        let object = self.object()?;
        let versions = object.datastream_versions(id);
        if versions.is_empty() {
            return Err(RepositoryError::ObjectNotFound(format!(
                "datastream {id} of {}",
                self.pid
            )));
        }
        Ok(versions.to_vec())
    }

    /// Bytes of datastream `id`.
    pub fn datastream_content(&self, id: &str, as_of: Option<&Timestamp>) -> RepositoryResult<Bytes> {
        let ds = self.datastream(id, as_of)?;
        if let Some(xml) = ds.xml_content() {
            return Ok(Bytes::copy_from_slice(xml));
        }
        let location = ds.location.as_deref().ok_or_else(|| {
            RepositoryError::ObjectIntegrity(format!("datastream {id} of {} has no location", self.pid))
        })?;
        match (ds.control_group, LocationKind::classify(location)) {
            (ControlGroup::ExternalReference, _) | (_, LocationKind::External) => {
                Ok(self.sources.fetcher.fetch(location)?.bytes)
            }
            _ => Ok(self.sources.datastreams.retrieve(location)?),
        }
    }

    // ---- Disseminators ----

    pub fn disseminators(&self, as_of: Option<&Timestamp>) -> RepositoryResult<Vec<Disseminator>> {
        if self.fast_path(as_of) {
            return Ok(self.fast.disseminators(&self.pid)?);
        }
        let object = self.object()?;
        Ok(object
            .disseminator_ids()
            .filter_map(|id| object.disseminator_as_of(id, as_of).cloned())
            .collect())
    }

    /// The disseminator serving `key`: the one bound to behavior definition
    /// `key`, or failing that the one whose id is `key`.
    pub fn disseminator_for(
        &self,
        key: &str,
        as_of: Option<&Timestamp>,
    ) -> RepositoryResult<Option<Disseminator>> {
        let all = self.disseminators(as_of)?;
        let by_bdef = all.iter().find(|d| d.bdef_pid.as_str() == key);
        Ok(by_bdef
            .or_else(|| all.iter().find(|d| d.id == key))
            .cloned())
    }

    // ---- Behavior objects ----

    /// Abstract methods declared by this behavior definition.
    pub fn behavior_spec(&self, as_of: Option<&Timestamp>) -> RepositoryResult<BehaviorSpec> {
        if self.fast_path(as_of) {
            if let Some(spec) = self.fast.behavior_spec(&self.pid)? {
                return Ok(spec);
            }
        }
        let mut spec = self.method_map(as_of)?.into_behavior_spec();
        spec.bdef_pid.get_or_insert_with(|| self.pid.clone());
        Ok(spec)
    }

    /// Abstract method definitions, with parameter domains.
    pub fn list_methods(&self, as_of: Option<&Timestamp>) -> RepositoryResult<Vec<MethodDef>> {
        Ok(self.behavior_spec(as_of)?.methods)
    }

    /// Concrete bindings of this behavior mechanism.
    pub fn mechanism_spec(&self, as_of: Option<&Timestamp>) -> RepositoryResult<MechanismSpec> {
        if self.fast_path(as_of) {
            if let Some(spec) = self.fast.mechanism_spec(&self.pid)? {
                return Ok(spec);
            }
        }
        Ok(self.method_map(as_of)?.into_mechanism_spec()?)
    }

    fn method_map(&self, as_of: Option<&Timestamp>) -> RepositoryResult<MethodMap> {
        let object = self.object()?;
        let ds = object
            .datastream_as_of(METHOD_MAP_DATASTREAM_ID, as_of)
            .ok_or_else(|| {
                RepositoryError::ObjectIntegrity(format!("{} has no method map", self.pid))
            })?;
        let xml = ds.xml_content().ok_or_else(|| {
            RepositoryError::ObjectIntegrity(format!("method map of {} is not inline XML", self.pid))
        })?;
        Ok(MethodMap::parse(xml)?)
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("pid", &self.pid)
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}
