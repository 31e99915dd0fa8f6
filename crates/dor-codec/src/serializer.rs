//! METS serializer.
//!
//! Regions are written in a fixed order: header, audit trail, metadata
//! sections, file section, binding maps, behavior sections. Within each
//! region components appear in id order and versions in append order, so
//! serializing the same object twice yields identical bytes.

use std::collections::BTreeMap;
use std::io::Write;

use dor_types::object::AUDIT_TRAIL_ID;
use dor_types::{
    format_timestamp, AuditRecord, ControlGroup, Datastream, DigitalObject, Disseminator,
    DsBindingMap, LocationKind, MdClass,
};

use crate::error::{CodecError, Result};
use crate::escape::xml_escape;
use crate::format::{check_encoding, AUDIT_NS, METS_NS, XLINK_NS};

/// Writes [`DigitalObject`]s as METS documents.
#[derive(Debug, Clone, Copy)]
pub struct MetsSerializer {
    _private: (),
}

impl MetsSerializer {
    pub fn new(encoding: &str) -> Result<Self> {
        check_encoding(encoding)?;
        Ok(Self { _private: () })
    }

    pub fn serialize<W: Write>(&self, object: &DigitalObject, out: W) -> Result<()> {
        let mut w = XmlWriter { out, depth: 0 };
        w.raw(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;

        let mut root = Attrs::default();
        let mut namespaces = object.namespaces.clone();
        namespaces.insert("METS".into(), METS_NS.into());
        namespaces.insert("xlink".into(), XLINK_NS.into());
        for (prefix, uri) in &namespaces {
            if prefix.is_empty() {
                root.push("xmlns", uri);
            } else {
                root.push_owned(format!("xmlns:{prefix}"), uri);
            }
        }
        root.push("OBJID", object.pid.as_str());
        root.push("LABEL", &object.label);
        root.push("TYPE", object.kind.document_type());
        root.opt("PROFILE", object.content_model.as_deref());
        w.open("METS:mets", &root)?;

        let mut header = Attrs::default();
        header.opt("CREATEDATE", object.created.as_ref().map(format_timestamp).as_deref());
        header.opt("LASTMODDATE", object.last_modified.as_ref().map(format_timestamp).as_deref());
        header.opt("RECORDSTATUS", object.state.map(|s| s.code().to_string()).as_deref());
        w.empty("METS:metsHdr", &header)?;

        if !object.audit_records.is_empty() {
            write_audit_trail(&mut w, &object.audit_records)?;
        }

        for (id, versions) in &object.datastreams {
            if versions.first().map(|v| v.control_group) == Some(ControlGroup::InlineXml) {
                write_metadata_section(&mut w, id, versions)?;
            }
        }

        let referenced: Vec<(&String, &Vec<Datastream>)> = object
            .datastreams
            .iter()
            .filter(|(_, v)| v.first().map(|d| d.control_group) != Some(ControlGroup::InlineXml))
            .collect();
        if !referenced.is_empty() {
            w.open("METS:fileSec", &Attrs::default())?;
            w.open("METS:fileGrp", &Attrs::one("ID", "DATASTREAMS"))?;
            for (id, versions) in referenced {
                write_file_group(&mut w, id, versions)?;
            }
            w.close("METS:fileGrp")?;
            w.close("METS:fileSec")?;
        }

        let mut maps: BTreeMap<&str, &DsBindingMap> = BTreeMap::new();
        for versions in object.disseminators.values() {
            for diss in versions {
                let map = maps.entry(diss.binding_map_id.as_str()).or_insert(&diss.binding_map);
                if *map != &diss.binding_map {
                    return Err(CodecError::integrity(format!(
                        "{} reuses binding map {} with different bindings",
                        diss.version_id, diss.binding_map_id
                    )));
                }
            }
        }
        for (struct_id, map) in maps {
            write_binding_map(&mut w, struct_id, map)?;
        }
        for versions in object.disseminators.values() {
            for diss in versions {
                write_behavior(&mut w, diss)?;
            }
        }

        w.close("METS:mets")?;
        w.raw(b"\n")?;
        w.out.flush()?;
        Ok(())
    }

    pub fn to_bytes(&self, object: &DigitalObject) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.serialize(object, &mut out)?;
        Ok(out)
    }
}

fn write_audit_trail<W: Write>(w: &mut XmlWriter<W>, records: &[AuditRecord]) -> Result<()> {
    w.open("METS:amdSec", &Attrs::one("ID", AUDIT_TRAIL_ID))?;
    for record in records {
        w.open("METS:digiprovMD", &Attrs::one("ID", &record.id))?;
        let mut wrap = Attrs::one("MIMETYPE", "text/xml");
        wrap.push("MDTYPE", "OTHER");
        wrap.push("LABEL", "Audit Trail for this object");
        w.open("METS:mdWrap", &wrap)?;
        w.open("METS:xmlData", &Attrs::default())?;

        let mut rec = Attrs::one("xmlns:audit", AUDIT_NS);
        rec.push("ID", &record.id);
        w.open("audit:record", &rec)?;
        w.empty("audit:process", &Attrs::one("type", &record.process_type))?;
        w.text_element("audit:action", &record.action)?;
        if let Some(component) = &record.component_id {
            w.text_element("audit:componentID", component)?;
        }
        w.text_element("audit:responsibility", &record.responsibility)?;
        w.text_element("audit:date", &format_timestamp(&record.date))?;
        w.text_element("audit:justification", &record.justification)?;
        w.close("audit:record")?;

        w.close("METS:xmlData")?;
        w.close("METS:mdWrap")?;
        w.close("METS:digiprovMD")?;
    }
    w.close("METS:amdSec")
}

fn write_metadata_section<W: Write>(w: &mut XmlWriter<W>, id: &str, versions: &[Datastream]) -> Result<()> {
    let first_class = versions
        .first()
        .and_then(|v| v.xml.as_ref())
        .map(|x| x.md_class)
        .unwrap_or(MdClass::Descriptive);
    let section = if first_class == MdClass::Descriptive {
        "METS:dmdSecFedora"
    } else {
        "METS:amdSec"
    };
    let section_state = versions.last().and_then(|v| v.state);

    let mut attrs = Attrs::one("ID", id);
    attrs.opt("STATUS", section_state.map(|s| s.code().to_string()).as_deref());
    w.open(section, &attrs)?;
    for version in versions {
        let xml = version.xml.as_ref().ok_or_else(|| {
            CodecError::integrity(format!("{} is inline XML without content", version.version_id))
        })?;
        let element = format!("METS:{}", xml.md_class.element_name());
        let mut attrs = Attrs::one("ID", &version.version_id);
        attrs.opt("CREATED", version.created.as_ref().map(format_timestamp).as_deref());
        attrs.opt("ADMID", id_refs(version).as_deref());
        if version.state.is_some() && version.state != section_state {
            attrs.opt("STATUS", version.state.map(|s| s.code().to_string()).as_deref());
        }
        w.open(&element, &attrs)?;

        let mut wrap = Attrs::one("MIMETYPE", &version.mime_type);
        wrap.push("MDTYPE", &xml.md_type);
        wrap.push("LABEL", &version.label);
        w.open("METS:mdWrap", &wrap)?;
        w.open("METS:xmlData", &Attrs::default())?;
        w.raw(&xml.content)?;
        w.close_inline("METS:xmlData")?;
        w.close("METS:mdWrap")?;
        w.close(&element)?;
    }
    w.close(section)
}

fn write_file_group<W: Write>(w: &mut XmlWriter<W>, id: &str, versions: &[Datastream]) -> Result<()> {
    let group_state = versions.last().and_then(|v| v.state);
    let mut attrs = Attrs::one("ID", id);
    attrs.opt("STATUS", group_state.map(|s| s.code().to_string()).as_deref());
    w.open("METS:fileGrp", &attrs)?;
    for version in versions {
        let location = version.location.as_deref().ok_or_else(|| {
            CodecError::integrity(format!("{} has no location", version.version_id))
        })?;
        let mut attrs = Attrs::one("ID", &version.version_id);
        attrs.opt("CREATED", version.created.as_ref().map(format_timestamp).as_deref());
        attrs.push("MIMETYPE", &version.mime_type);
        attrs.push_owned("OWNERID".into(), &version.control_group.code().to_string());
        attrs.opt("SIZE", version.size.map(|s| s.to_string()).as_deref());
        attrs.opt("ADMID", id_refs(version).as_deref());
        if version.state.is_some() && version.state != group_state {
            attrs.opt("STATUS", version.state.map(|s| s.code().to_string()).as_deref());
        }
        w.open("METS:file", &attrs)?;

        let loc_type = match LocationKind::classify(location) {
            LocationKind::External => "URL",
            _ => "INTERNAL_ID",
        };
        let mut loc = Attrs::one("LOCTYPE", loc_type);
        loc.push("xlink:href", location);
        loc.push("xlink:title", &version.label);
        w.empty("METS:FLocat", &loc)?;
        w.close("METS:file")?;
    }
    w.close("METS:fileGrp")
}

fn write_binding_map<W: Write>(w: &mut XmlWriter<W>, struct_id: &str, map: &DsBindingMap) -> Result<()> {
    let mut attrs = Attrs::one("ID", struct_id);
    attrs.push("TYPE", "fedora:dsBindingMap");
    w.open("METS:structMap", &attrs)?;
    let mut outer = Attrs::one("TYPE", map.mechanism_pid.as_str());
    outer.push("LABEL", &map.label);
    w.open("METS:div", &outer)?;
    for binding in &map.bindings {
        let mut attrs = Attrs::one("TYPE", &binding.binding_key);
        attrs.push("LABEL", &binding.label);
        attrs.push_owned("ORDER".into(), &binding.seq.to_string());
        w.open("METS:div", &attrs)?;
        w.empty("METS:fptr", &Attrs::one("FILEID", &binding.datastream_id))?;
        w.close("METS:div")?;
    }
    w.close("METS:div")?;
    w.close("METS:structMap")
}

fn write_behavior<W: Write>(w: &mut XmlWriter<W>, diss: &Disseminator) -> Result<()> {
    let mut attrs = Attrs::one("ID", &diss.version_id);
    attrs.push("STRUCTID", &diss.binding_map_id);
    attrs.push("BTYPE", diss.bdef_pid.as_str());
    attrs.opt("CREATED", diss.created.as_ref().map(format_timestamp).as_deref());
    attrs.push("LABEL", &diss.label);
    attrs.push("GROUPID", &diss.id);
    attrs.opt("STATUS", diss.state.map(|s| s.code().to_string()).as_deref());
    w.open("METS:behaviorSec", &attrs)?;

    let mut bdef = Attrs::one("LOCTYPE", "URN");
    bdef.push("xlink:href", diss.bdef_pid.as_str());
    w.empty("METS:interfaceDef", &bdef)?;
    let mut bmech = Attrs::one("LOCTYPE", "URN");
    bmech.push("xlink:href", diss.bmech_pid.as_str());
    w.empty("METS:mechanism", &bmech)?;
    w.close("METS:behaviorSec")
}

/// Audit ids first, then metadata ids; the parser classifies them back.
fn id_refs(ds: &Datastream) -> Option<String> {
    let refs: Vec<&str> = ds
        .audit_record_ids
        .iter()
        .chain(&ds.metadata_ids)
        .map(String::as_str)
        .collect();
    (!refs.is_empty()).then(|| refs.join(" "))
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Attrs(Vec<(String, String)>);

impl Attrs {
    fn one(name: &str, value: &str) -> Self {
        let mut attrs = Self::default();
        attrs.push(name, value);
        attrs
    }

    fn push(&mut self, name: &str, value: &str) {
        self.0.push((name.to_string(), value.to_string()));
    }

    fn push_owned(&mut self, name: String, value: &str) {
        self.0.push((name, value.to_string()));
    }

    fn opt(&mut self, name: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.push(name, value);
        }
    }
}

struct XmlWriter<W: Write> {
    out: W,
    depth: usize,
}

impl<W: Write> XmlWriter<W> {
    fn raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        Ok(())
    }

    fn tag(&mut self, name: &str, attrs: &Attrs, close: &str) -> Result<()> {
        self.out.write_all(b"\n")?;
        for _ in 0..self.depth {
            self.out.write_all(b"  ")?;
        }
        write!(self.out, "<{name}")?;
        for (key, value) in &attrs.0 {
            write!(self.out, " {key}=\"{}\"", xml_escape(value))?;
        }
        self.out.write_all(close.as_bytes())?;
        Ok(())
    }

    fn open(&mut self, name: &str, attrs: &Attrs) -> Result<()> {
        self.tag(name, attrs, ">")?;
        self.depth += 1;
        Ok(())
    }

    fn empty(&mut self, name: &str, attrs: &Attrs) -> Result<()> {
        self.tag(name, attrs, "/>")
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.tag(name, &Attrs::default(), ">")?;
        write!(self.out, "{}</{name}>", xml_escape(text))?;
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.depth = self.depth.saturating_sub(1);
        self.out.write_all(b"\n")?;
        for _ in 0..self.depth {
            self.out.write_all(b"  ")?;
        }
        write!(self.out, "</{name}>")?;
        Ok(())
    }

    /// Close without a preceding line break, keeping inline content exact.
    fn close_inline(&mut self, name: &str) -> Result<()> {
        self.depth = self.depth.saturating_sub(1);
        write!(self.out, "</{name}>")?;
        Ok(())
    }
}
