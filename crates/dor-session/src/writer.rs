//! Exclusive, in-memory editing of one object.
//!
//! Every edit appends a new version (or removes versions, for purges) and
//! records an audit entry. Nothing reaches storage until the writer is
//! committed through the session manager.

use tracing::debug;

use dor_types::{
    now_utc, AuditRecord, ComponentState, ControlGroup, Datastream, DigitalObject, Disseminator,
    DsBinding, DsBindingMap, InlineXml, MdClass, ObjectState, Pid, Timestamp,
};

use crate::error::{RepositoryError, RepositoryResult};
use crate::locks::WriterGuard;

/// Process type recorded on audit entries made through a writer.
pub const AUDIT_PROCESS_TYPE: &str = "Fedora API-M";

/// Content of a new datastream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatastreamContent {
    /// Inline XML of the given metadata class.
    InlineXml { md_class: MdClass, xml: Vec<u8> },
    /// Managed content at a staging, copy, URL, or internal location.
    Managed { location: String },
    /// Content left where it is and referenced by URL.
    External { url: String },
}

/// Changes applied by [`ObjectWriter::modify_datastream`]. `None` keeps the
/// current value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatastreamUpdate {
    pub label: Option<String>,
    pub mime_type: Option<String>,
    /// New location for managed or external datastreams.
    pub location: Option<String>,
    /// New content for inline XML datastreams.
    pub xml: Option<Vec<u8>>,
}

/// Exclusive writer over one object.
#[derive(Debug)]
pub struct ObjectWriter {
    object: DigitalObject,
    responsibility: String,
    new_object: bool,
    committed: bool,
    removed: bool,
    /// Locations of purged managed versions, deleted once a commit lands.
    purged_content: Vec<String>,
    _guard: WriterGuard,
}

impl ObjectWriter {
    pub(crate) fn new(
        object: DigitalObject,
        responsibility: String,
        new_object: bool,
        guard: WriterGuard,
    ) -> Self {
        Self {
            object,
            responsibility,
            new_object,
            committed: false,
            removed: false,
            purged_content: Vec::new(),
            _guard: guard,
        }
    }

    pub fn pid(&self) -> &Pid {
        &self.object.pid
    }

    pub fn object(&self) -> &DigitalObject {
        &self.object
    }

    /// Whether the object has never been committed.
    pub fn is_new(&self) -> bool {
        self.new_object
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub(crate) fn object_mut(&mut self) -> &mut DigitalObject {
        &mut self.object
    }

    pub(crate) fn mark_committed(&mut self) {
        self.committed = true;
        self.new_object = false;
    }

    pub(crate) fn mark_removed(&mut self) {
        self.removed = true;
        self.committed = true;
    }

    pub(crate) fn take_purged_content(&mut self) -> Vec<String> {
        std::mem::take(&mut self.purged_content)
    }

    fn ensure_open(&self) -> RepositoryResult<()> {
        if self.removed {
            return Err(RepositoryError::ObjectNotFound(format!(
                "{} was removed",
                self.object.pid
            )));
        }
        Ok(())
    }

    fn audit(&mut self, action: &str, component: Option<&str>, log_message: &str, date: Timestamp) {
        let record = AuditRecord {
            id: self.object.next_audit_record_id(),
            process_type: AUDIT_PROCESS_TYPE.into(),
            action: action.into(),
            component_id: component.map(str::to_string),
            responsibility: self.responsibility.clone(),
            date,
            justification: log_message.into(),
        };
        debug!(pid = %self.object.pid, action, audit = %record.id, "recorded edit");
        self.object.audit_records.push(record);
    }

    // ---- Object properties ----

    pub fn set_label(&mut self, label: &str, log_message: &str) -> RepositoryResult<()> {
        self.ensure_open()?;
        self.object.label = label.into();
        self.audit("modifyObject", None, log_message, now_utc());
        Ok(())
    }

    pub fn set_state(&mut self, state: ObjectState, log_message: &str) -> RepositoryResult<()> {
        self.ensure_open()?;
        self.object.state = Some(state);
        self.audit("modifyObject", None, log_message, now_utc());
        Ok(())
    }

    pub fn set_content_model(&mut self, model: Option<&str>, log_message: &str) -> RepositoryResult<()> {
        self.ensure_open()?;
        self.object.content_model = model.map(str::to_string);
        self.audit("modifyObject", None, log_message, now_utc());
        Ok(())
    }

    // ---- Datastreams ----

    /// Add datastream `id` with a first version. Returns the version id.
    pub fn add_datastream(
        &mut self,
        id: &str,
        label: &str,
        mime_type: &str,
        content: DatastreamContent,
        log_message: &str,
    ) -> RepositoryResult<String> {
        self.ensure_open()?;
        if !self.object.datastream_versions(id).is_empty() {
            return Err(RepositoryError::ObjectIntegrity(format!(
                "datastream {id} already exists in {}",
                self.object.pid
            )));
        }
        let version_id = self.object.next_datastream_version_id(id);
        let mut ds = match content {
            DatastreamContent::InlineXml { md_class, xml } => {
                Datastream::inline_xml(id, version_id.clone(), md_class, label, xml)
            }
            DatastreamContent::Managed { location } => Datastream::referenced(
                id,
                version_id.clone(),
                ControlGroup::ManagedContent,
                label,
                mime_type,
                location,
            ),
            DatastreamContent::External { url } => Datastream::referenced(
                id,
                version_id.clone(),
                ControlGroup::ExternalReference,
                label,
                mime_type,
                url,
            ),
        };
        if !mime_type.is_empty() {
            ds.mime_type = mime_type.into();
        }
        let now = now_utc();
        ds.state = Some(ComponentState::Active);
        ds.created = Some(now);
        self.object.add_datastream_version(ds)?;
        self.audit("addDatastream", Some(id), log_message, now);
        Ok(version_id)
    }

    /// Append a version of datastream `id` with `update` applied. Returns
    /// the new version id.
    pub fn modify_datastream(
        &mut self,
        id: &str,
        update: DatastreamUpdate,
        log_message: &str,
    ) -> RepositoryResult<String> {
        self.ensure_open()?;
        let mut ds = self.current_datastream(id)?.clone();
        match (ds.control_group, update.xml, update.location) {
            (ControlGroup::InlineXml, Some(xml), _) => {
                ds.size = Some(xml.len() as u64);
                let md_type = ds.xml.as_ref().map(|x| x.md_type.clone()).unwrap_or_else(|| "OTHER".into());
                let md_class = ds.xml.as_ref().map(|x| x.md_class).unwrap_or(MdClass::Descriptive);
                ds.xml = Some(InlineXml { md_class, md_type, content: xml });
            }
            (ControlGroup::InlineXml, None, Some(_)) => {
                return Err(RepositoryError::ObjectIntegrity(format!(
                    "inline datastream {id} has no location"
                )));
            }
            (_, Some(_), _) => {
                return Err(RepositoryError::ObjectIntegrity(format!(
                    "datastream {id} does not hold inline XML"
                )));
            }
            (_, None, Some(location)) => {
                ds.location = Some(location);
                ds.size = None;
            }
            (_, None, None) => {}
        }
        if let Some(label) = update.label {
            ds.label = label;
        }
        if let Some(mime_type) = update.mime_type {
            ds.mime_type = mime_type;
        }
        self.append_datastream_version(ds, "modifyDatastream", log_message)
    }

    pub fn set_datastream_state(
        &mut self,
        id: &str,
        state: ComponentState,
        log_message: &str,
    ) -> RepositoryResult<String> {
        self.ensure_open()?;
        let mut ds = self.current_datastream(id)?.clone();
        ds.state = Some(state);
        self.append_datastream_version(ds, "setDatastreamState", log_message)
    }

    /// Remove the versions of datastream `id` created at or before `end`
    /// (all versions when `None`; undated versions survive a bounded purge).
    /// Returns the removed version ids.
    pub fn purge_datastream(
        &mut self,
        id: &str,
        end: Option<&Timestamp>,
        log_message: &str,
    ) -> RepositoryResult<Vec<String>> {
        self.ensure_open()?;
        self.current_datastream(id)?;
        let versions = self.object.datastreams.entry(id.to_string()).or_default();
        let mut purged = Vec::new();
        let mut content = Vec::new();
        versions.retain(|d| {
            let remove = match (end, d.created.as_ref()) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(end), Some(created)) => created <= end,
            };
            if remove {
                purged.push(d.version_id.clone());
                if d.control_group == ControlGroup::ManagedContent {
                    content.extend(d.location.clone());
                }
            }
            !remove
        });
        self.purged_content.extend(content);
        if versions.is_empty() {
            self.object.datastreams.remove(id);
        }
        self.audit("purgeDatastream", Some(id), log_message, now_utc());
        Ok(purged)
    }

    fn current_datastream(&self, id: &str) -> RepositoryResult<&Datastream> {
        self.object.datastream_as_of(id, None).ok_or_else(|| {
            RepositoryError::ObjectNotFound(format!("datastream {id} of {}", self.object.pid))
        })
    }

    fn append_datastream_version(
        &mut self,
        mut ds: Datastream,
        action: &str,
        log_message: &str,
    ) -> RepositoryResult<String> {
        let id = ds.id.clone();
        let now = now_utc();
        ds.version_id = self.object.next_datastream_version_id(&id);
        ds.created = Some(now);
        let version_id = ds.version_id.clone();
        self.object.add_datastream_version(ds)?;
        self.audit(action, Some(&id), log_message, now);
        Ok(version_id)
    }

    // ---- Disseminators ----

    /// Add a disseminator binding this object to `bdef` through `bmech`.
    /// Returns the new disseminator id.
    pub fn add_disseminator(
        &mut self,
        bdef: Pid,
        bmech: Pid,
        label: &str,
        bindings: Vec<DsBinding>,
        log_message: &str,
    ) -> RepositoryResult<String> {
        self.ensure_open()?;
        for binding in &bindings {
            self.current_datastream(&binding.datastream_id)?;
        }
        let id = self.object.next_disseminator_id();
        let map_id = self.object.next_binding_map_id();
        let now = now_utc();
        let diss = Disseminator {
            version_id: self.object.next_disseminator_version_id(&id),
            id: id.clone(),
            bdef_pid: bdef,
            bmech_pid: bmech.clone(),
            binding_map_id: map_id.clone(),
            label: label.into(),
            state: Some(ComponentState::Active),
            created: Some(now),
            binding_map: DsBindingMap {
                id: map_id,
                mechanism_pid: bmech,
                label: label.into(),
                bindings,
            },
        };
        self.object.add_disseminator_version(diss)?;
        self.audit("addDisseminator", Some(&id), log_message, now);
        Ok(id)
    }

    /// Append a version of disseminator `id`, optionally switching its
    /// mechanism, label, or bindings. Returns the new version id.
    pub fn modify_disseminator(
        &mut self,
        id: &str,
        bmech: Option<Pid>,
        label: Option<&str>,
        bindings: Option<Vec<DsBinding>>,
        log_message: &str,
    ) -> RepositoryResult<String> {
        self.ensure_open()?;
        let mut diss = self
            .object
            .disseminator_as_of(id, None)
            .cloned()
            .ok_or_else(|| {
                RepositoryError::ObjectNotFound(format!("disseminator {id} of {}", self.object.pid))
            })?;
        if let Some(bmech) = bmech {
            diss.binding_map.mechanism_pid = bmech.clone();
            diss.bmech_pid = bmech;
        }
        if let Some(label) = label {
            diss.label = label.into();
        }
        if let Some(bindings) = bindings {
            for binding in &bindings {
                self.current_datastream(&binding.datastream_id)?;
            }
            diss.binding_map.bindings = bindings;
        }
        if self.object.disseminator_versions(id).iter().all(|v| v.binding_map != diss.binding_map) {
            let map_id = self.object.next_binding_map_id();
            diss.binding_map.id = map_id.clone();
            diss.binding_map_id = map_id;
        }
        let now = now_utc();
        diss.version_id = self.object.next_disseminator_version_id(id);
        diss.created = Some(now);
        let version_id = diss.version_id.clone();
        self.object.add_disseminator_version(diss)?;
        self.audit("modifyDisseminator", Some(id), log_message, now);
        Ok(version_id)
    }

    pub fn purge_disseminator(&mut self, id: &str, log_message: &str) -> RepositoryResult<()> {
        self.ensure_open()?;
        if self.object.disseminators.remove(id).is_none() {
            return Err(RepositoryError::ObjectNotFound(format!(
                "disseminator {id} of {}",
                self.object.pid
            )));
        }
        self.audit("purgeDisseminator", Some(id), log_message, now_utc());
        Ok(())
    }
}
