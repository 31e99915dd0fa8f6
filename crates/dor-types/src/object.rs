use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audit::AuditRecord;
use crate::datastream::Datastream;
use crate::disseminator::Disseminator;
use crate::error::TypeError;
use crate::pid::Pid;
use crate::temporal::Timestamp;

/// Reserved datastream id holding an object's audit trail.
pub const AUDIT_TRAIL_ID: &str = "FEDORA-AUDITTRAIL";

/// Reserved datastream id of the descriptive (Dublin Core) metadata.
pub const DC_DATASTREAM_ID: &str = "DC";

/// Reserved datastream id of the relationship (RDF) metadata.
pub const RELS_EXT_DATASTREAM_ID: &str = "RELS-EXT";

/// Reserved datastream id of a behavior object's method map.
pub const METHOD_MAP_DATASTREAM_ID: &str = "METHODMAP";

// ---------------------------------------------------------------------------
// ObjectState / ObjectKind
// ---------------------------------------------------------------------------

/// Lifecycle state of a digital object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectState {
    #[default]
    Active,
    Withdrawn,
    MarkedForDeletion,
    PendingDeletion,
}

impl ObjectState {
    pub fn code(&self) -> char {
        match self {
            Self::Active => 'A',
            Self::Withdrawn => 'W',
            Self::MarkedForDeletion => 'C',
            Self::PendingDeletion => 'D',
        }
    }

    pub fn from_code(code: &str) -> Result<Self, TypeError> {
        match code {
            "A" => Ok(Self::Active),
            "W" => Ok(Self::Withdrawn),
            "C" => Ok(Self::MarkedForDeletion),
            "D" => Ok(Self::PendingDeletion),
            other => Err(TypeError::InvalidCode {
                kind: "object state",
                code: other.to_string(),
            }),
        }
    }
}

/// What role an object plays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    #[default]
    DataObject,
    BehaviorDefinition,
    BehaviorMechanism,
}

impl ObjectKind {
    /// Registry kind code.
    pub fn code(&self) -> char {
        match self {
            Self::DataObject => 'O',
            Self::BehaviorDefinition => 'D',
            Self::BehaviorMechanism => 'M',
        }
    }

    pub fn from_code(code: &str) -> Result<Self, TypeError> {
        match code {
            "O" => Ok(Self::DataObject),
            "D" => Ok(Self::BehaviorDefinition),
            "M" => Ok(Self::BehaviorMechanism),
            other => Err(TypeError::InvalidCode {
                kind: "object kind",
                code: other.to_string(),
            }),
        }
    }

    /// The `TYPE` attribute written on the document root.
    pub fn document_type(&self) -> &'static str {
        match self {
            Self::DataObject => "FedoraObject",
            Self::BehaviorDefinition => "FedoraBDefObject",
            Self::BehaviorMechanism => "FedoraBMechObject",
        }
    }

    pub fn from_document_type(s: &str) -> Result<Self, TypeError> {
        match s {
            "FedoraObject" => Ok(Self::DataObject),
            "FedoraBDefObject" => Ok(Self::BehaviorDefinition),
            "FedoraBMechObject" => Ok(Self::BehaviorMechanism),
            other => Err(TypeError::InvalidCode {
                kind: "object type",
                code: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.document_type())
    }
}

// ---------------------------------------------------------------------------
// DigitalObject
// ---------------------------------------------------------------------------

/// A digital object: a typed container of versioned datastreams and
/// disseminators.
///
/// Version lists are kept in creation order. Within one component id the
/// create dates never decrease; [`DigitalObject::add_datastream_version`]
/// and [`DigitalObject::add_disseminator_version`] enforce this.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalObject {
    pub pid: Pid,
    pub label: String,
    pub state: Option<ObjectState>,
    pub kind: ObjectKind,
    pub content_model: Option<String>,
    pub created: Option<Timestamp>,
    pub last_modified: Option<Timestamp>,
    /// Namespace prefix to URI, as declared on the document root.
    pub namespaces: BTreeMap<String, String>,
    pub audit_records: Vec<AuditRecord>,
    pub datastreams: BTreeMap<String, Vec<Datastream>>,
    pub disseminators: BTreeMap<String, Vec<Disseminator>>,
}

impl DigitalObject {
    pub fn new(pid: Pid, kind: ObjectKind) -> Self {
        Self {
            pid,
            label: String::new(),
            state: None,
            kind,
            content_model: None,
            created: None,
            last_modified: None,
            namespaces: BTreeMap::new(),
            audit_records: Vec::new(),
            datastreams: BTreeMap::new(),
            disseminators: BTreeMap::new(),
        }
    }

    pub fn effective_state(&self) -> ObjectState {
        self.state.unwrap_or_default()
    }

    // ---- Datastreams ----

    pub fn datastream_ids(&self) -> impl Iterator<Item = &str> {
        self.datastreams.keys().map(String::as_str)
    }

    pub fn datastream_versions(&self, id: &str) -> &[Datastream] {
        self.datastreams.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Latest version of `id` created at or before `as_of` (latest overall
    /// when `as_of` is `None`).
    pub fn datastream_as_of(&self, id: &str, as_of: Option<&Timestamp>) -> Option<&Datastream> {
        latest_as_of(self.datastream_versions(id), as_of, |d| d.created.as_ref())
    }

    /// Append a datastream version, enforcing id uniqueness and date order.
    pub fn add_datastream_version(&mut self, ds: Datastream) -> Result<(), TypeError> {
        let versions = self.datastreams.entry(ds.id.clone()).or_default();
        check_append(versions, &ds.version_id, ds.created.as_ref(), &ds.id, |d| {
            (&d.version_id, d.created.as_ref())
        })?;
        versions.push(ds);
        Ok(())
    }

    /// Next unused version id for datastream `id` (`ID.n`).
    pub fn next_datastream_version_id(&self, id: &str) -> String {
        next_version_id(id, self.datastream_versions(id).iter().map(|d| d.version_id.as_str()))
    }

    // ---- Disseminators ----

    pub fn disseminator_ids(&self) -> impl Iterator<Item = &str> {
        self.disseminators.keys().map(String::as_str)
    }

    pub fn disseminator_versions(&self, id: &str) -> &[Disseminator] {
        self.disseminators
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn disseminator_as_of(&self, id: &str, as_of: Option<&Timestamp>) -> Option<&Disseminator> {
        latest_as_of(self.disseminator_versions(id), as_of, |d| d.created.as_ref())
    }

    /// The disseminator version (as of `as_of`) bound to `bdef`, if any.
    pub fn disseminator_for_bdef(&self, bdef: &Pid, as_of: Option<&Timestamp>) -> Option<&Disseminator> {
        self.disseminators
            .keys()
            .filter_map(|id| self.disseminator_as_of(id, as_of))
            .find(|d| &d.bdef_pid == bdef)
    }

    pub fn add_disseminator_version(&mut self, diss: Disseminator) -> Result<(), TypeError> {
        let versions = self.disseminators.entry(diss.id.clone()).or_default();
        check_append(versions, &diss.version_id, diss.created.as_ref(), &diss.id, |d| {
            (&d.version_id, d.created.as_ref())
        })?;
        versions.push(diss);
        Ok(())
    }

    pub fn next_disseminator_version_id(&self, id: &str) -> String {
        next_version_id(
            id,
            self.disseminator_versions(id).iter().map(|d| d.version_id.as_str()),
        )
    }

    /// Next unused disseminator id (`DISSn`).
    pub fn next_disseminator_id(&self) -> String {
        next_numbered("DISS", self.disseminators.keys().map(String::as_str))
    }

    /// Next binding map id (`Sn`) not used by any disseminator version.
    pub fn next_binding_map_id(&self) -> String {
        next_numbered(
            "S",
            self.disseminators
                .values()
                .flatten()
                .map(|d| d.binding_map_id.as_str()),
        )
    }

    // ---- Audit ----

    /// Next unused audit record id (`AUDRECn`).
    pub fn next_audit_record_id(&self) -> String {
        next_numbered("AUDREC", self.audit_records.iter().map(|a| a.id.as_str()))
    }

    pub fn has_audit_record(&self, id: &str) -> bool {
        self.audit_records.iter().any(|a| a.id == id)
    }
}

fn latest_as_of<'a, T>(
    versions: &'a [T],
    as_of: Option<&Timestamp>,
    created: impl Fn(&T) -> Option<&Timestamp>,
) -> Option<&'a T> {
    match as_of {
        None => versions.last(),
        Some(limit) => versions
            .iter()
            .rev()
            .find(|v| created(v).map(|c| c <= limit).unwrap_or(true)),
    }
}

fn check_append<T>(
    versions: &[T],
    version_id: &str,
    created: Option<&Timestamp>,
    component: &str,
    fields: impl Fn(&T) -> (&String, Option<&Timestamp>),
) -> Result<(), TypeError> {
    if versions.iter().any(|v| fields(v).0 == version_id) {
        return Err(TypeError::DuplicateVersion {
            component: component.to_string(),
            version_id: version_id.to_string(),
        });
    }
    let last_created = versions.last().and_then(|v| fields(v).1);
    if let (Some(last), Some(new)) = (last_created, created) {
        if new < last {
            return Err(TypeError::VersionOrder {
                component: component.to_string(),
                version_id: version_id.to_string(),
            });
        }
    }
    Ok(())
}

fn next_version_id<'a>(id: &str, existing: impl Iterator<Item = &'a str>) -> String {
    let next = existing
        .filter_map(|v| v.rsplit_once('.').and_then(|(_, n)| n.parse::<u64>().ok()))
        .max()
        .map(|n| n + 1)
        .unwrap_or(0);
    format!("{id}.{next}")
}

fn next_numbered<'a>(prefix: &str, existing: impl Iterator<Item = &'a str>) -> String {
    let next = existing
        .filter_map(|v| v.strip_prefix(prefix).and_then(|n| n.parse::<u64>().ok()))
        .max()
        .map(|n| n + 1)
        .unwrap_or(1);
    format!("{prefix}{next}")
}
