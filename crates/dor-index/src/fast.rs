//! The fast store: a denormalized projection of committed objects.
//!
//! Each committed object is flattened into one [`Projection`]: its header
//! row, the current version of every datastream and disseminator, and, for
//! behavior objects, their parsed method maps. Readers answer unversioned
//! queries from here without deserializing the object document.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tracing::debug;

use dor_codec::MethodMap;
use dor_types::object::METHOD_MAP_DATASTREAM_ID;
use dor_types::{
    BehaviorSpec, Datastream, DigitalObject, Disseminator, MechanismSpec, ObjectKind, ObjectState,
    Pid, Timestamp,
};

use crate::error::{poisoned, IndexError, IndexResult};

/// Header fields of a projected object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRow {
    pub pid: Pid,
    pub kind: ObjectKind,
    pub label: String,
    pub state: ObjectState,
    pub content_model: Option<String>,
    pub created: Option<Timestamp>,
    pub last_modified: Option<Timestamp>,
}

/// Everything the fast store keeps for one object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Projection {
    pub row: ObjectRow,
    pub datastreams: BTreeMap<String, Datastream>,
    pub disseminators: BTreeMap<String, Disseminator>,
    pub behavior: Option<BehaviorSpec>,
    pub mechanism: Option<MechanismSpec>,
}

impl Projection {
    pub fn of(object: &DigitalObject) -> IndexResult<Self> {
        let datastreams: BTreeMap<String, Datastream> = object
            .datastream_ids()
            .filter_map(|id| object.datastream_as_of(id, None))
            .map(|ds| (ds.id.clone(), ds.clone()))
            .collect();
        let disseminators = object
            .disseminator_ids()
            .filter_map(|id| object.disseminator_as_of(id, None))
            .map(|d| (d.id.clone(), d.clone()))
            .collect();

        let method_map = datastreams
            .get(METHOD_MAP_DATASTREAM_ID)
            .and_then(Datastream::xml_content)
            .map(MethodMap::parse)
            .transpose()?;
        let (behavior, mechanism) = match (object.kind, method_map) {
            (ObjectKind::BehaviorDefinition, Some(map)) => {
                let mut spec = map.into_behavior_spec();
                spec.bdef_pid.get_or_insert_with(|| object.pid.clone());
                (Some(spec), None)
            }
            (ObjectKind::BehaviorMechanism, Some(map)) => (None, Some(map.into_mechanism_spec()?)),
            _ => (None, None),
        };

        Ok(Self {
            row: ObjectRow {
                pid: object.pid.clone(),
                kind: object.kind,
                label: object.label.clone(),
                state: object.effective_state(),
                content_model: object.content_model.clone(),
                created: object.created,
                last_modified: object.last_modified,
            },
            datastreams,
            disseminators,
            behavior,
            mechanism,
        })
    }
}

/// Which role another object's disseminator gives a pid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dependency {
    BehaviorDefinition,
    BehaviorMechanism,
}

/// Query-optimized store of committed objects.
pub trait FastStore: Send + Sync {
    /// Replace everything stored for `object.pid` with a fresh projection.
    fn replicate(&self, object: &DigitalObject) -> IndexResult<()>;

    /// Drop the projection of `pid`.
    fn delete(&self, pid: &Pid) -> IndexResult<()>;

    fn contains(&self, pid: &Pid) -> IndexResult<bool>;

    fn object_row(&self, pid: &Pid) -> IndexResult<Option<ObjectRow>>;

    /// Current version of datastream `id`.
    fn datastream(&self, pid: &Pid, id: &str) -> IndexResult<Option<Datastream>>;

    /// Current versions of all datastreams, in id order.
    fn datastreams(&self, pid: &Pid) -> IndexResult<Vec<Datastream>>;

    /// Current versions of all disseminators, in id order.
    fn disseminators(&self, pid: &Pid) -> IndexResult<Vec<Disseminator>>;

    /// Abstract methods of behavior definition `bdef`.
    fn behavior_spec(&self, bdef: &Pid) -> IndexResult<Option<BehaviorSpec>>;

    /// Concrete method bindings of mechanism `bmech`.
    fn mechanism_spec(&self, bmech: &Pid) -> IndexResult<Option<MechanismSpec>>;

    /// Number of disseminators on objects other than `pid` that use it in
    /// the given role.
    fn count_dependents(&self, pid: &Pid, dependency: Dependency) -> IndexResult<usize>;
}

/// An in-memory implementation of [`FastStore`].
#[derive(Debug, Default)]
pub struct InMemoryFastStore {
    projections: RwLock<BTreeMap<Pid, Projection>>,
    queries: AtomicU64,
}

impl InMemoryFastStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read queries served so far.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.projections.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_projection<T>(
        &self,
        pid: &Pid,
        f: impl FnOnce(&Projection) -> T,
    ) -> IndexResult<Option<T>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let projections = self.projections.read().map_err(poisoned)?;
        Ok(projections.get(pid).map(f))
    }
}

impl FastStore for InMemoryFastStore {
    fn replicate(&self, object: &DigitalObject) -> IndexResult<()> {
        let projection = Projection::of(object)?;
        let mut projections = self.projections.write().map_err(poisoned)?;
        debug!(
            pid = %object.pid,
            datastreams = projection.datastreams.len(),
            "replicated object to fast store"
        );
        projections.insert(object.pid.clone(), projection);
        Ok(())
    }

    fn delete(&self, pid: &Pid) -> IndexResult<()> {
        let mut projections = self.projections.write().map_err(poisoned)?;
        if projections.remove(pid).is_none() {
            return Err(IndexError::NotFound(pid.clone()));
        }
        debug!(%pid, "deleted object from fast store");
        Ok(())
    }

    fn contains(&self, pid: &Pid) -> IndexResult<bool> {
        Ok(self.with_projection(pid, |_| ())?.is_some())
    }

    fn object_row(&self, pid: &Pid) -> IndexResult<Option<ObjectRow>> {
        self.with_projection(pid, |p| p.row.clone())
    }

    fn datastream(&self, pid: &Pid, id: &str) -> IndexResult<Option<Datastream>> {
        Ok(self
            .with_projection(pid, |p| p.datastreams.get(id).cloned())?
            .flatten())
    }

    fn datastreams(&self, pid: &Pid) -> IndexResult<Vec<Datastream>> {
        Ok(self
            .with_projection(pid, |p| p.datastreams.values().cloned().collect())?
            .unwrap_or_default())
    }

    fn disseminators(&self, pid: &Pid) -> IndexResult<Vec<Disseminator>> {
        Ok(self
            .with_projection(pid, |p| p.disseminators.values().cloned().collect())?
            .unwrap_or_default())
    }

    fn behavior_spec(&self, bdef: &Pid) -> IndexResult<Option<BehaviorSpec>> {
        Ok(self.with_projection(bdef, |p| p.behavior.clone())?.flatten())
    }

    fn mechanism_spec(&self, bmech: &Pid) -> IndexResult<Option<MechanismSpec>> {
        Ok(self.with_projection(bmech, |p| p.mechanism.clone())?.flatten())
    }

    fn count_dependents(&self, pid: &Pid, dependency: Dependency) -> IndexResult<usize> {
        let projections = self.projections.read().map_err(poisoned)?;
        let count = projections
            .values()
            .filter(|p| &p.row.pid != pid)
            .flat_map(|p| p.disseminators.values())
            .filter(|d| match dependency {
                Dependency::BehaviorDefinition => &d.bdef_pid == pid,
                Dependency::BehaviorMechanism => &d.bmech_pid == pid,
            })
            .count();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dor_types::{ControlGroup, DsBindingMap, MdClass};

    fn pid(s: &str) -> Pid {
        Pid::parse(s).unwrap()
    }

    fn data_object(p: &str) -> DigitalObject {
        let mut obj = DigitalObject::new(pid(p), ObjectKind::DataObject);
        obj.label = "data".into();
        obj.add_datastream_version(Datastream::referenced(
            "IMG", "IMG.0", ControlGroup::ExternalReference, "v0", "image/png", "http://a/0",
        ))
        .unwrap();
        obj.add_datastream_version(Datastream::referenced(
            "IMG", "IMG.1", ControlGroup::ExternalReference, "v1", "image/png", "http://a/1",
        ))
        .unwrap();
        obj.add_disseminator_version(Disseminator {
            id: "DISS1".into(),
            version_id: "DISS1.0".into(),
            bdef_pid: pid("demo:bdef"),
            bmech_pid: pid("demo:bmech"),
            binding_map_id: "S1".into(),
            label: "diss".into(),
            state: None,
            created: None,
            binding_map: DsBindingMap {
                id: "S1".into(),
                mechanism_pid: pid("demo:bmech"),
                label: String::new(),
                bindings: Vec::new(),
            },
        })
        .unwrap();
        obj
    }

    #[test]
    fn projection_keeps_current_versions_only() {
        let store = InMemoryFastStore::new();
        store.replicate(&data_object("demo:1")).unwrap();
        let ds = store.datastream(&pid("demo:1"), "IMG").unwrap().unwrap();
        assert_eq!(ds.version_id, "IMG.1");
        assert_eq!(store.datastreams(&pid("demo:1")).unwrap().len(), 1);
        assert_eq!(store.object_row(&pid("demo:1")).unwrap().unwrap().state, ObjectState::Active);
    }

    #[test]
    fn missing_object_yields_none() {
        let store = InMemoryFastStore::new();
        assert!(store.object_row(&pid("demo:9")).unwrap().is_none());
        assert!(store.datastreams(&pid("demo:9")).unwrap().is_empty());
        assert!(!store.contains(&pid("demo:9")).unwrap());
    }

    #[test]
    fn dependents_counted_across_objects() {
        let store = InMemoryFastStore::new();
        store.replicate(&data_object("demo:1")).unwrap();
        store.replicate(&data_object("demo:2")).unwrap();
        assert_eq!(
            store.count_dependents(&pid("demo:bdef"), Dependency::BehaviorDefinition).unwrap(),
            2
        );
        assert_eq!(
            store.count_dependents(&pid("demo:bmech"), Dependency::BehaviorMechanism).unwrap(),
            2
        );
        assert_eq!(
            store.count_dependents(&pid("demo:bmech"), Dependency::BehaviorDefinition).unwrap(),
            0
        );
    }

    #[test]
    fn behavior_objects_expose_method_maps() {
        let mut bdef = DigitalObject::new(pid("demo:bdef"), ObjectKind::BehaviorDefinition);
        let map = br#"<MethodMap><Method operationName="view"><UserInputParm parmName="size" required="true"/></Method></MethodMap>"#;
        bdef.add_datastream_version(Datastream::inline_xml(
            METHOD_MAP_DATASTREAM_ID,
            "METHODMAP.0",
            MdClass::Technical,
            "methods",
            map.to_vec(),
        ))
        .unwrap();
        let store = InMemoryFastStore::new();
        store.replicate(&bdef).unwrap();
        let spec = store.behavior_spec(&pid("demo:bdef")).unwrap().unwrap();
        assert_eq!(spec.bdef_pid, Some(pid("demo:bdef")));
        assert_eq!(spec.methods[0].name, "view");
    }

    #[test]
    fn delete_removes_projection() {
        let store = InMemoryFastStore::new();
        store.replicate(&data_object("demo:1")).unwrap();
        store.delete(&pid("demo:1")).unwrap();
        assert!(store.is_empty());
        assert!(matches!(store.delete(&pid("demo:1")), Err(IndexError::NotFound(_))));
    }

    #[test]
    fn queries_are_counted() {
        let store = InMemoryFastStore::new();
        store.replicate(&data_object("demo:1")).unwrap();
        let before = store.queries();
        store.datastream(&pid("demo:1"), "IMG").unwrap();
        assert_eq!(store.queries(), before + 1);
    }
}
