//! Resource index: the object graph as subject/predicate/object statements.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::debug;

use dor_codec::Relationships;
use dor_types::object::RELS_EXT_DATASTREAM_ID;
use dor_types::{DigitalObject, Pid, Triple, TripleObject};

use crate::error::{poisoned, IndexError, IndexResult};

/// Predicates for statements derived from the object itself.
pub mod predicates {
    pub const LABEL: &str = "info:fedora/fedora-system:def/model#label";
    pub const STATE: &str = "info:fedora/fedora-system:def/model#state";
    pub const KIND: &str = "info:fedora/fedora-system:def/model#kind";
    pub const CONTENT_MODEL: &str = "info:fedora/fedora-system:def/model#contentModel";
    pub const DISSEMINATES: &str = "info:fedora/fedora-system:def/view#disseminates";
    pub const USES_BDEF: &str = "info:fedora/fedora-system:def/model#usesBDef";
    pub const USES_BMECH: &str = "info:fedora/fedora-system:def/model#usesBMech";
}

/// All statements about `object`: its system properties, one
/// `disseminates` per datastream, one `usesBDef`/`usesBMech` pair per
/// disseminator, and everything declared in `RELS-EXT`.
pub fn object_triples(object: &DigitalObject) -> IndexResult<Vec<Triple>> {
    let subject = object.pid.to_uri();
    let mut triples = vec![
        Triple::literal(&subject, predicates::LABEL, &object.label),
        Triple::literal(
            &subject,
            predicates::STATE,
            object.effective_state().code().to_string(),
        ),
        Triple::literal(&subject, predicates::KIND, object.kind.document_type()),
    ];
    if let Some(model) = &object.content_model {
        triples.push(Triple::literal(&subject, predicates::CONTENT_MODEL, model));
    }
    for id in object.datastream_ids() {
        triples.push(Triple::resource(
            &subject,
            predicates::DISSEMINATES,
            format!("{subject}/{id}"),
        ));
    }
    for diss in object
        .disseminator_ids()
        .filter_map(|id| object.disseminator_as_of(id, None))
    {
        triples.push(Triple::resource(&subject, predicates::USES_BDEF, diss.bdef_pid.to_uri()));
        triples.push(Triple::resource(&subject, predicates::USES_BMECH, diss.bmech_pid.to_uri()));
    }

    if let Some(rels) = object
        .datastream_as_of(RELS_EXT_DATASTREAM_ID, None)
        .and_then(|ds| ds.xml_content())
    {
        let rels = Relationships::parse(rels)?;
        rels.check_subject(&object.pid)?;
        triples.extend(rels.triples);
    }
    Ok(triples)
}

/// Graph index over committed objects.
pub trait ResourceIndex: Send + Sync {
    /// Index a new object. Fails if it is already present.
    fn add_object(&self, object: &DigitalObject) -> IndexResult<()>;

    /// Replace the statements of an indexed object.
    fn modify_object(&self, object: &DigitalObject) -> IndexResult<()>;

    fn delete_object(&self, pid: &Pid) -> IndexResult<()>;

    /// Statements whose subject is `pid`.
    fn triples_for(&self, pid: &Pid) -> IndexResult<Vec<Triple>>;

    /// Subjects holding `predicate` with object `value`.
    fn find_subjects(&self, predicate: &str, value: &str) -> IndexResult<Vec<Pid>>;
}

/// An in-memory implementation of [`ResourceIndex`].
#[derive(Debug, Default)]
pub struct InMemoryResourceIndex {
    graph: RwLock<BTreeMap<Pid, Vec<Triple>>>,
}

impl InMemoryResourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, pid: &Pid) -> bool {
        self.graph.read().map(|g| g.contains_key(pid)).unwrap_or(false)
    }
}

impl ResourceIndex for InMemoryResourceIndex {
    fn add_object(&self, object: &DigitalObject) -> IndexResult<()> {
        let triples = object_triples(object)?;
        let mut graph = self.graph.write().map_err(poisoned)?;
        if graph.contains_key(&object.pid) {
            return Err(IndexError::AlreadyIndexed(object.pid.clone()));
        }
        debug!(pid = %object.pid, triples = triples.len(), "added object to resource index");
        graph.insert(object.pid.clone(), triples);
        Ok(())
    }

    fn modify_object(&self, object: &DigitalObject) -> IndexResult<()> {
        let triples = object_triples(object)?;
        let mut graph = self.graph.write().map_err(poisoned)?;
        let slot = graph
            .get_mut(&object.pid)
            .ok_or_else(|| IndexError::NotFound(object.pid.clone()))?;
        *slot = triples;
        debug!(pid = %object.pid, "modified object in resource index");
        Ok(())
    }

    fn delete_object(&self, pid: &Pid) -> IndexResult<()> {
        let mut graph = self.graph.write().map_err(poisoned)?;
        graph.remove(pid).ok_or_else(|| IndexError::NotFound(pid.clone()))?;
        Ok(())
    }

    fn triples_for(&self, pid: &Pid) -> IndexResult<Vec<Triple>> {
        let graph = self.graph.read().map_err(poisoned)?;
        Ok(graph.get(pid).cloned().unwrap_or_default())
    }

    fn find_subjects(&self, predicate: &str, value: &str) -> IndexResult<Vec<Pid>> {
        let graph = self.graph.read().map_err(poisoned)?;
        Ok(graph
            .iter()
            .filter(|(_, triples)| {
                triples.iter().any(|t| {
                    t.predicate == predicate
                        && match &t.object {
                            TripleObject::Resource(r) => r == value,
                            TripleObject::Literal(l) => l == value,
                        }
                })
            })
            .map(|(pid, _)| pid.clone())
            .collect())
    }
}
