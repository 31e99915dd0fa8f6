//! Streaming METS deserializer.
//!
//! The document is consumed one pull event at a time; nothing but the
//! current inline XML section is buffered. Cross-region references are
//! collected while parsing and resolved once the root element closes:
//!
//! - `ADMID`/`DMDID` ids on a version are classified as audit records or
//!   metadata sections (an id that names neither is an integrity error),
//! - `structMap` binding maps and `behaviorSec` entries sharing a
//!   structural-map id are joined into disseminator versions.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::BufRead;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use dor_store::{ContentFetcher, ContentStore};
use dor_types::datastream::STAGING_PREFIX;
use dor_types::object::AUDIT_TRAIL_ID;
use dor_types::{
    parse_timestamp, AuditRecord, ComponentState, ControlGroup, Datastream, DigitalObject,
    Disseminator, DsBinding, DsBindingMap, InlineXml, LocationKind, MdClass, ObjectKind,
    ObjectState, Pid, Timestamp,
};

use crate::error::{CodecError, Result};
use crate::format::check_encoding;
use crate::state::{
    transition, AuditBuilder, BehaviorBuilder, BindingMapBuilder, FileBuilder, FileGroupBuilder,
    MetadataVersionBuilder, ParseState, Partial, SectionBuilder,
};

/// Whether undeclared size or MIME type of external content is confirmed
/// by fetching it while parsing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalQuery {
    #[default]
    Never,
    IfUndeclared,
}

/// Parses METS documents into [`DigitalObject`]s.
pub struct MetsDeserializer<'a> {
    staging: Option<&'a dyn ContentStore>,
    fetcher: Option<&'a dyn ContentFetcher>,
    external_query: ExternalQuery,
}

impl<'a> MetsDeserializer<'a> {
    /// Create a deserializer for documents in `encoding`. Anything but
    /// UTF-8 is rejected here, before any input is read.
    pub fn new(encoding: &str) -> Result<Self> {
        check_encoding(encoding)?;
        Ok(Self {
            staging: None,
            fetcher: None,
            external_query: ExternalQuery::Never,
        })
    }

    /// Store inline base64 content in `staging` under `uploaded://` ids.
    pub fn with_staging(mut self, staging: &'a dyn ContentStore) -> Self {
        self.staging = Some(staging);
        self
    }

    pub fn with_fetcher(mut self, fetcher: &'a dyn ContentFetcher, query: ExternalQuery) -> Self {
        self.fetcher = Some(fetcher);
        self.external_query = query;
        self
    }

    pub fn deserialize<R: BufRead>(&self, input: R) -> Result<DigitalObject> {
        let mut reader = Reader::from_reader(input);
        reader.trim_text(false);
        reader.check_end_names(true);

        let mut parser = Parser::new(self);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_event_into(&mut buf)? {
                Event::Decl(decl) => {
                    if let Some(encoding) = decl.encoding() {
                        let encoding = encoding?;
                        check_encoding(&String::from_utf8_lossy(&encoding))?;
                    }
                }
                Event::Start(e) => parser.start(&e, false)?,
                Event::Empty(e) => parser.start(&e, true)?,
                Event::End(e) => parser.end(&e)?,
                Event::Text(t) => parser.text(&t)?,
                Event::CData(c) => {
                    let raw: &[u8] = &c;
                    parser.cdata(raw)?;
                }
                Event::Comment(c) => parser.inline_raw(b"<!--", &c, b"-->"),
                Event::PI(p) => parser.inline_raw(b"<?", &p, b"?>"),
                Event::DocType(_) => {}
                Event::Eof => break,
            }
        }
        parser.finish()
    }

    /// Convenience wrapper over an in-memory document.
    pub fn deserialize_bytes(&self, bytes: &[u8]) -> Result<DigitalObject> {
        self.deserialize(bytes)
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Attributes of one start tag, keyed by local name, with namespace
/// declarations split out.
#[derive(Debug, Default)]
struct Attrs {
    values: HashMap<String, String>,
    namespaces: Vec<(String, String)>,
}

impl Attrs {
    fn read(e: &BytesStart<'_>) -> Result<Self> {
        let mut attrs = Attrs::default();
        for attr in e.attributes() {
            let attr = attr?;
            let key = attr.key.as_ref();
            let value = attr.unescape_value()?.into_owned();
            if key == b"xmlns" {
                attrs.namespaces.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                attrs.namespaces.push((utf8(prefix)?.to_string(), value));
            } else {
                let local = utf8(attr.key.local_name().as_ref())?.to_string();
                attrs.values.insert(local, value);
            }
        }
        Ok(attrs)
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn string(&self, name: &str) -> String {
        self.get(name).unwrap_or_default().to_string()
    }

    fn required(&self, name: &str, element: &str) -> Result<String> {
        self.get(name)
            .map(str::to_string)
            .ok_or_else(|| CodecError::integrity(format!("<{element}> is missing {name}")))
    }

    fn timestamp(&self, name: &str) -> Result<Option<Timestamp>> {
        self.get(name).map(parse_timestamp).transpose().map_err(Into::into)
    }

    fn component_state(&self) -> Result<Option<ComponentState>> {
        self.get("STATUS")
            .map(ComponentState::from_code)
            .transpose()
            .map_err(Into::into)
    }

    fn id_refs(&self) -> Vec<String> {
        ["ADMID", "DMDID"]
            .iter()
            .filter_map(|name| self.get(name))
            .flat_map(str::split_whitespace)
            .map(str::to_string)
            .collect()
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| CodecError::integrity(format!("invalid UTF-8: {e}")))
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// A datastream version waiting for its id references to be classified.
struct PendingVersion {
    datastream: Datastream,
    refs: Vec<String>,
}

#[derive(Default)]
struct DocumentBuilder {
    pid: Option<String>,
    label: String,
    kind: Option<ObjectKind>,
    content_model: Option<String>,
    state: Option<ObjectState>,
    created: Option<Timestamp>,
    last_modified: Option<Timestamp>,
    namespaces: BTreeMap<String, String>,
    audit_records: Vec<AuditRecord>,
    section_ids: HashSet<String>,
    versions: Vec<PendingVersion>,
    binding_maps: HashMap<String, BindingMapBuilder>,
    behaviors: Vec<BehaviorBuilder>,
}

struct Parser<'d, 'a> {
    options: &'d MetsDeserializer<'a>,
    states: Vec<ParseState>,
    partials: Vec<Partial>,
    doc: DocumentBuilder,
    closed: bool,
}

impl<'d, 'a> Parser<'d, 'a> {
    fn new(options: &'d MetsDeserializer<'a>) -> Self {
        Self {
            options,
            states: Vec::new(),
            partials: Vec::new(),
            doc: DocumentBuilder::default(),
            closed: false,
        }
    }

    fn current(&self) -> ParseState {
        self.states.last().copied().unwrap_or(ParseState::Start)
    }

    fn inline_buffer(&mut self) -> Option<&mut Vec<u8>> {
        if !matches!(self.current(), ParseState::InlineXml { .. }) {
            return None;
        }
        match self.partials.last_mut() {
            Some(Partial::MetadataVersion(v)) => Some(&mut v.content),
            _ => None,
        }
    }

    fn inline_raw(&mut self, open: &[u8], raw: &[u8], close: &[u8]) {
        if let Some(out) = self.inline_buffer() {
            out.extend_from_slice(open);
            out.extend_from_slice(raw);
            out.extend_from_slice(close);
        }
    }

    // ---- Events ----

    fn start(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<()> {
        if self.closed {
            return Err(CodecError::integrity("content after the root element"));
        }
        let state = self.current();
        if let ParseState::InlineXml { depth } = state {
            let raw: &[u8] = e;
            if empty {
                self.inline_raw(b"<", raw, b"/>");
            } else {
                self.inline_raw(b"<", raw, b">");
                self.states.push(ParseState::InlineXml { depth: depth + 1 });
            }
            return Ok(());
        }

        let local = utf8(e.local_name().as_ref())?.to_string();
        let attrs = Attrs::read(e)?;
        let audit_section = local == "amdSec" && attrs.get("ID") == Some(AUDIT_TRAIL_ID);
        let next = transition(state, &local, audit_section).ok_or_else(|| {
            CodecError::integrity(format!("unexpected element <{local}> in {state:?}"))
        })?;
        self.enter(next, &local, attrs)?;
        self.states.push(next);
        if empty {
            self.leave()?;
        }
        Ok(())
    }

    fn end(&mut self, e: &BytesEnd<'_>) -> Result<()> {
        if let ParseState::InlineXml { depth } = self.current() {
            if depth > 0 {
                let raw: &[u8] = e;
                self.inline_raw(b"</", raw, b">");
            }
        }
        self.leave()
    }

    fn text(&mut self, t: &BytesText<'_>) -> Result<()> {
        match self.current() {
            ParseState::InlineXml { .. } => {
                let raw: &[u8] = t;
                self.inline_raw(b"", raw, b"");
            }
            ParseState::AuditText(field) => {
                let value = t.unescape()?;
                if let Some(Partial::Audit(audit)) = self.partials.last_mut() {
                    audit.field_mut(field).push_str(&value);
                }
            }
            ParseState::BinData => {
                let raw: &[u8] = t;
                let value = utf8(raw)?;
                if let Some(Partial::File(file)) = self.partials.last_mut() {
                    file.encoded.extend(value.chars().filter(|c| !c.is_whitespace()));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn cdata(&mut self, raw: &[u8]) -> Result<()> {
        match self.current() {
            ParseState::InlineXml { .. } => self.inline_raw(b"<![CDATA[", raw, b"]]>"),
            ParseState::AuditText(field) => {
                let value = utf8(raw)?.to_string();
                if let Some(Partial::Audit(audit)) = self.partials.last_mut() {
                    audit.field_mut(field).push_str(&value);
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ---- Entering elements ----

    fn enter(&mut self, state: ParseState, local: &str, attrs: Attrs) -> Result<()> {
        match state {
            ParseState::Document => {
                self.doc.pid = Some(attrs.required("OBJID", local)?);
                self.doc.label = attrs.string("LABEL");
                self.doc.kind = attrs
                    .get("TYPE")
                    .map(ObjectKind::from_document_type)
                    .transpose()?;
                self.doc.content_model = attrs.get("PROFILE").map(str::to_string);
                self.doc.namespaces.extend(attrs.namespaces);
            }
            ParseState::Header => {
                self.doc.created = attrs.timestamp("CREATEDATE")?;
                self.doc.last_modified = attrs.timestamp("LASTMODDATE")?;
                self.doc.state = attrs
                    .get("RECORDSTATUS")
                    .map(ObjectState::from_code)
                    .transpose()?;
            }
            ParseState::AuditEntry => {
                self.partials.push(Partial::Audit(AuditBuilder {
                    id: attrs.required("ID", local)?,
                    ..AuditBuilder::default()
                }));
            }
            ParseState::AuditText(crate::state::AuditField::Process) => {
                if let (Some(Partial::Audit(audit)), Some(kind)) =
                    (self.partials.last_mut(), attrs.get("type"))
                {
                    audit.process_type = kind.to_string();
                }
            }
            ParseState::MetadataSection => {
                self.partials.push(Partial::Section(SectionBuilder {
                    id: attrs.required("ID", local)?,
                    state: attrs.component_state()?,
                }));
            }
            ParseState::MetadataVersion => {
                let md_class = MdClass::from_element_name(local)
                    .ok_or_else(|| CodecError::integrity(format!("unknown metadata class {local}")))?;
                let state = attrs.component_state()?;
                self.partials.push(Partial::MetadataVersion(MetadataVersionBuilder {
                    version_id: attrs.required("ID", local)?,
                    md_class,
                    created: attrs.timestamp("CREATED")?,
                    label: String::new(),
                    mime_type: "text/xml".into(),
                    md_type: "OTHER".into(),
                    admids: attrs.id_refs(),
                    content: Vec::new(),
                    state,
                }));
            }
            ParseState::MetadataWrap => {
                if let Some(Partial::MetadataVersion(v)) = self.partials.last_mut() {
                    v.label = attrs.string("LABEL");
                    if let Some(mime) = attrs.get("MIMETYPE") {
                        v.mime_type = mime.to_string();
                    }
                    if let Some(md_type) = attrs.get("MDTYPE") {
                        v.md_type = md_type.to_string();
                    }
                }
            }
            ParseState::FileGroups => {}
            ParseState::FileGroup => {
                self.partials.push(Partial::FileGroup(FileGroupBuilder {
                    id: attrs.required("ID", local)?,
                    state: attrs.component_state()?,
                }));
            }
            ParseState::File => {
                let control_group = ControlGroup::from_code(&attrs.required("OWNERID", local)?)?;
                if control_group == ControlGroup::InlineXml {
                    return Err(CodecError::integrity(
                        "inline XML datastreams belong in a metadata section",
                    ));
                }
                let size = attrs
                    .get("SIZE")
                    .map(|s| {
                        s.parse::<u64>()
                            .map_err(|_| CodecError::integrity(format!("invalid SIZE {s}")))
                    })
                    .transpose()?;
                self.partials.push(Partial::File(FileBuilder {
                    version_id: attrs.required("ID", local)?,
                    control_group,
                    created: attrs.timestamp("CREATED")?,
                    mime_type: attrs.get("MIMETYPE").map(str::to_string),
                    size: size.filter(|s| *s > 0),
                    label: String::new(),
                    location: None,
                    admids: attrs.id_refs(),
                    encoded: String::new(),
                    inline: false,
                    state: attrs.component_state()?,
                }));
            }
            ParseState::FileLocation => {
                if let Some(Partial::File(file)) = self.partials.last_mut() {
                    file.location = Some(attrs.required("href", local)?);
                    file.label = attrs.string("title");
                }
            }
            ParseState::BinData => {
                if let Some(Partial::File(file)) = self.partials.last_mut() {
                    file.inline = true;
                }
            }
            ParseState::StructMap => {
                self.partials.push(Partial::BindingMap(BindingMapBuilder {
                    struct_id: attrs.required("ID", local)?,
                    mechanism: String::new(),
                    label: String::new(),
                    bindings: Vec::new(),
                }));
            }
            ParseState::BindingMap => {
                if let Some(Partial::BindingMap(map)) = self.partials.last_mut() {
                    map.mechanism = attrs.string("TYPE");
                    map.label = attrs.string("LABEL");
                }
            }
            ParseState::Binding => {
                let seq = attrs
                    .get("ORDER")
                    .map(|s| {
                        s.parse::<u32>()
                            .map_err(|_| CodecError::integrity(format!("invalid ORDER {s}")))
                    })
                    .transpose()?
                    .unwrap_or(0);
                self.partials.push(Partial::Binding(DsBinding {
                    binding_key: attrs.required("TYPE", local)?,
                    datastream_id: String::new(),
                    label: attrs.string("LABEL"),
                    seq,
                }));
            }
            ParseState::BindingPointer => {
                if let Some(Partial::Binding(binding)) = self.partials.last_mut() {
                    binding.datastream_id = attrs.required("FILEID", local)?;
                }
            }
            ParseState::BehaviorSection => {
                self.partials.push(Partial::Behavior(BehaviorBuilder {
                    disseminator_id: attrs.required("GROUPID", local)?,
                    version_id: attrs.required("ID", local)?,
                    struct_id: attrs.required("STRUCTID", local)?,
                    label: attrs.string("LABEL"),
                    created: attrs.timestamp("CREATED")?,
                    state: attrs.component_state()?,
                    bdef: attrs.get("BTYPE").map(str::to_string),
                    bmech: None,
                }));
            }
            ParseState::InterfaceDef | ParseState::Mechanism => {
                if let Some(Partial::Behavior(behavior)) = self.partials.last_mut() {
                    let href = attrs.required("href", local)?;
                    if state == ParseState::InterfaceDef {
                        behavior.bdef = Some(href);
                    } else {
                        behavior.bmech = Some(href);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ---- Leaving elements ----

    fn leave(&mut self) -> Result<()> {
        let state = self
            .states
            .pop()
            .ok_or_else(|| CodecError::integrity("unbalanced end tag"))?;
        match state {
            ParseState::Document => self.closed = true,
            ParseState::AuditEntry => {
                let Some(Partial::Audit(audit)) = self.partials.pop() else {
                    return Err(misplaced("audit record"));
                };
                self.doc.audit_records.push(audit.build()?);
            }
            ParseState::MetadataVersion => {
                let Some(Partial::MetadataVersion(v)) = self.partials.pop() else {
                    return Err(misplaced("metadata version"));
                };
                let Some(Partial::Section(section)) = self.partials.last() else {
                    return Err(misplaced("metadata section"));
                };
                let datastream = Datastream {
                    id: section.id.clone(),
                    version_id: v.version_id,
                    control_group: ControlGroup::InlineXml,
                    label: v.label,
                    mime_type: v.mime_type,
                    state: v.state.or(section.state),
                    created: v.created,
                    location: None,
                    size: Some(v.content.len() as u64),
                    metadata_ids: Vec::new(),
                    audit_record_ids: Vec::new(),
                    xml: Some(InlineXml {
                        md_class: v.md_class,
                        md_type: v.md_type,
                        content: v.content,
                    }),
                };
                self.doc.versions.push(PendingVersion {
                    datastream,
                    refs: v.admids,
                });
            }
            ParseState::MetadataSection => {
                let Some(Partial::Section(section)) = self.partials.pop() else {
                    return Err(misplaced("metadata section"));
                };
                self.doc.section_ids.insert(section.id);
            }
            ParseState::File => {
                let Some(Partial::File(file)) = self.partials.pop() else {
                    return Err(misplaced("file"));
                };
                let Some(Partial::FileGroup(group)) = self.partials.last() else {
                    return Err(misplaced("file group"));
                };
                let (id, group_state) = (group.id.clone(), group.state);
                let pending = self.complete_file(id, group_state, file)?;
                self.doc.versions.push(pending);
            }
            ParseState::FileGroup => {
                let Some(Partial::FileGroup(_)) = self.partials.pop() else {
                    return Err(misplaced("file group"));
                };
            }
            ParseState::Binding => {
                let Some(Partial::Binding(binding)) = self.partials.pop() else {
                    return Err(misplaced("binding"));
                };
                if binding.datastream_id.is_empty() {
                    return Err(CodecError::integrity(format!(
                        "binding {} has no fptr",
                        binding.binding_key
                    )));
                }
                let Some(Partial::BindingMap(map)) = self.partials.last_mut() else {
                    return Err(misplaced("binding map"));
                };
                map.bindings.push(binding);
            }
            ParseState::StructMap => {
                let Some(Partial::BindingMap(map)) = self.partials.pop() else {
                    return Err(misplaced("binding map"));
                };
                if self.doc.binding_maps.contains_key(&map.struct_id) {
                    return Err(CodecError::integrity(format!(
                        "duplicate structMap id {}",
                        map.struct_id
                    )));
                }
                self.doc.binding_maps.insert(map.struct_id.clone(), map);
            }
            ParseState::BehaviorSection => {
                let Some(Partial::Behavior(behavior)) = self.partials.pop() else {
                    return Err(misplaced("behaviorSec"));
                };
                self.doc.behaviors.push(behavior);
            }
            _ => {}
        }
        Ok(())
    }

    fn complete_file(
        &self,
        id: String,
        group_state: Option<ComponentState>,
        file: FileBuilder,
    ) -> Result<PendingVersion> {
        let mut size = file.size;
        let mut mime_type = file.mime_type;

        let location = if file.inline {
            let staging = self.options.staging.ok_or_else(|| {
                CodecError::integrity(format!("inline content for {id} but no staging store"))
            })?;
            let bytes = STANDARD
                .decode(file.encoded.as_bytes())
                .map_err(|e| CodecError::integrity(format!("invalid base64 in {id}: {e}")))?;
            let staged_id = uuid::Uuid::now_v7().to_string();
            staging.add(&staged_id, &bytes)?;
            size = size.or(Some(bytes.len() as u64));
            debug!(datastream = %id, staged_id, bytes = bytes.len(), "staged inline content");
            format!("{STAGING_PREFIX}{staged_id}")
        } else {
            file.location
                .ok_or_else(|| CodecError::integrity(format!("file {} has no location", file.version_id)))?
        };

        let undeclared = size.is_none() || mime_type.is_none();
        if undeclared
            && self.options.external_query == ExternalQuery::IfUndeclared
            && LocationKind::classify(&location) == LocationKind::External
        {
            if let Some(fetcher) = self.options.fetcher {
                match fetcher.fetch(&location) {
                    Ok(fetched) => {
                        size = size.or(Some(fetched.bytes.len() as u64));
                        mime_type = mime_type.or(fetched.mime_type);
                    }
                    Err(e) => warn!(url = %location, error = %e, "external content query failed"),
                }
            }
        }

        let datastream = Datastream {
            id,
            version_id: file.version_id,
            control_group: file.control_group,
            label: file.label,
            mime_type: mime_type.unwrap_or_else(|| "application/octet-stream".into()),
            state: file.state.or(group_state),
            created: file.created,
            location: Some(location),
            size,
            metadata_ids: Vec::new(),
            audit_record_ids: Vec::new(),
            xml: None,
        };
        Ok(PendingVersion {
            datastream,
            refs: file.admids,
        })
    }

    // ---- Document end ----

    fn finish(self) -> Result<DigitalObject> {
        if !self.closed || !self.states.is_empty() {
            return Err(CodecError::integrity("document ended before the root element closed"));
        }
        let doc = self.doc;
        let pid_str = doc
            .pid
            .ok_or_else(|| CodecError::integrity("document has no OBJID"))?;
        let pid = Pid::parse(&pid_str)?;

        let mut object = DigitalObject::new(pid, doc.kind.unwrap_or_default());
        object.label = doc.label;
        object.state = doc.state;
        object.content_model = doc.content_model;
        object.created = doc.created;
        object.last_modified = doc.last_modified;
        object.namespaces = doc.namespaces;

        let audit_ids: HashSet<&str> = doc.audit_records.iter().map(|a| a.id.as_str()).collect();
        for pending in doc.versions {
            let mut ds = pending.datastream;
            for reference in pending.refs {
                if audit_ids.contains(reference.as_str()) {
                    ds.audit_record_ids.push(reference);
                } else if doc.section_ids.contains(&reference) {
                    ds.metadata_ids.push(reference);
                } else {
                    return Err(CodecError::integrity(format!(
                        "{} references unknown id {reference}",
                        ds.version_id
                    )));
                }
            }
            object.add_datastream_version(ds)?;
        }
        object.audit_records = doc.audit_records;

        let binding_maps = doc.binding_maps;
        for behavior in doc.behaviors {
            let map = binding_maps.get(&behavior.struct_id).ok_or_else(|| {
                CodecError::integrity(format!(
                    "behaviorSec {} references unknown structMap {}",
                    behavior.version_id, behavior.struct_id
                ))
            })?;
            let bdef = behavior
                .bdef
                .ok_or_else(|| CodecError::integrity(format!("{} has no interfaceDef", behavior.version_id)))?;
            let bmech = behavior
                .bmech
                .ok_or_else(|| CodecError::integrity(format!("{} has no mechanism", behavior.version_id)))?;
            let bmech_pid = Pid::parse(&bmech)?;
            let mechanism_pid = if map.mechanism.is_empty() {
                bmech_pid.clone()
            } else {
                Pid::parse(&map.mechanism)?
            };

            let mut bindings = map.bindings.clone();
            bindings.sort_by_key(|b| b.seq);
            for binding in &bindings {
                if !object.datastreams.contains_key(&binding.datastream_id) {
                    return Err(CodecError::integrity(format!(
                        "binding {} targets unknown datastream {}",
                        binding.binding_key, binding.datastream_id
                    )));
                }
            }

            object.add_disseminator_version(Disseminator {
                id: behavior.disseminator_id,
                version_id: behavior.version_id,
                bdef_pid: Pid::parse(&bdef)?,
                bmech_pid,
                binding_map_id: behavior.struct_id.clone(),
                label: behavior.label,
                state: behavior.state,
                created: behavior.created,
                binding_map: DsBindingMap {
                    id: behavior.struct_id,
                    mechanism_pid,
                    label: map.label.clone(),
                    bindings,
                },
            })?;
        }
        debug!(
            pid = %object.pid,
            datastreams = object.datastreams.len(),
            disseminators = object.disseminators.len(),
            "deserialized object"
        );
        Ok(object)
    }
}

fn misplaced(what: &str) -> CodecError {
    CodecError::integrity(format!("misplaced {what}"))
}
