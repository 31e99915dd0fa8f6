//! Structural validation without building an object.
//!
//! Walks the document with the same region grammar the deserializer uses
//! and checks the attributes every region requires. Used to reject a
//! document before deserializing it, and to re-check freshly serialized
//! bytes.

use std::collections::HashSet;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use dor_types::object::AUDIT_TRAIL_ID;
use dor_types::{ObjectKind, Pid};

use crate::error::{CodecError, Result};
use crate::format::DocumentFormat;
use crate::state::{transition, ParseState};

/// Check that `bytes` is a structurally valid document in `format`.
pub fn validate(bytes: &[u8], format: DocumentFormat) -> Result<()> {
    match format {
        DocumentFormat::Mets => validate_mets(bytes),
    }
}

fn validate_mets(bytes: &[u8]) -> Result<()> {
    let mut reader = Reader::from_reader(bytes);
    reader.check_end_names(true);

    let mut states: Vec<ParseState> = Vec::new();
    let mut seen_root = false;
    let mut struct_ids: HashSet<String> = HashSet::new();
    let mut struct_refs: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let (e, empty) = match reader.read_event_into(&mut buf)? {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(_) => {
                states.pop();
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        let state = states.last().copied().unwrap_or(ParseState::Start);
        if state == ParseState::Start && seen_root {
            return Err(CodecError::integrity("content after the root element"));
        }
        if matches!(state, ParseState::InlineXml { .. } | ParseState::Skip) {
            if !empty {
                states.push(state);
            }
            continue;
        }

        let local = std::str::from_utf8(e.local_name().as_ref())
            .map_err(|err| CodecError::integrity(format!("invalid element name: {err}")))?
            .to_string();
        let id = attribute(&e, "ID")?;
        let audit = local == "amdSec" && id.as_deref() == Some(AUDIT_TRAIL_ID);
        let next = transition(state, &local, audit).ok_or_else(|| {
            CodecError::integrity(format!("unexpected element <{local}> in {state:?}"))
        })?;

        let required: &[&str] = match next {
            ParseState::Document => {
                seen_root = true;
                let pid = attribute(&e, "OBJID")?
                    .ok_or_else(|| CodecError::integrity("root element is missing OBJID"))?;
                Pid::parse(&pid)?;
                if let Some(kind) = attribute(&e, "TYPE")? {
                    ObjectKind::from_document_type(&kind)?;
                }
                &[]
            }
            ParseState::MetadataSection | ParseState::FileGroup | ParseState::AuditEntry => &["ID"],
            ParseState::MetadataVersion => &["ID"],
            ParseState::File => &["ID", "OWNERID"],
            ParseState::FileLocation => &["href"],
            ParseState::StructMap => {
                if let Some(id) = &id {
                    struct_ids.insert(id.clone());
                }
                &["ID"]
            }
            ParseState::Binding => &["TYPE"],
            ParseState::BindingPointer => &["FILEID"],
            ParseState::BehaviorSection => {
                if let Some(s) = attribute(&e, "STRUCTID")? {
                    struct_refs.push(s);
                }
                &["ID", "STRUCTID", "GROUPID"]
            }
            ParseState::InterfaceDef | ParseState::Mechanism => &["href"],
            _ => &[],
        };
        for name in required {
            if attribute(&e, name)?.is_none() {
                return Err(CodecError::integrity(format!("<{local}> is missing {name}")));
            }
        }

        if !empty {
            states.push(next);
        }
    }

    if !seen_root {
        return Err(CodecError::integrity("document has no root element"));
    }
    if !states.is_empty() {
        return Err(CodecError::integrity("document ended before the root element closed"));
    }
    if let Some(missing) = struct_refs.iter().find(|s| !struct_ids.contains(*s)) {
        return Err(CodecError::integrity(format!("unknown structMap {missing}")));
    }
    Ok(())
}

/// Value of the attribute whose local name is `name`, if present and non-empty.
fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key.starts_with(b"xmlns") {
            continue;
        }
        if attr.key.local_name().as_ref() == name.as_bytes() {
            let value = attr.unescape_value()?.into_owned();
            return Ok((!value.is_empty()).then_some(value));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::SAMPLE;

    #[test]
    fn sample_is_valid() {
        validate(SAMPLE.as_bytes(), DocumentFormat::Mets).unwrap();
    }

    #[test]
    fn wrong_root_is_rejected() {
        let doc = br#"<foxml:digitalObject PID="demo:1"/>"#;
        assert!(matches!(
            validate(doc, DocumentFormat::Mets),
            Err(CodecError::ObjectIntegrity(_))
        ));
    }

    #[test]
    fn invalid_pid_is_rejected() {
        let doc = SAMPLE.replace(r#"OBJID="demo:5""#, r#"OBJID="no pid here""#);
        assert!(validate(doc.as_bytes(), DocumentFormat::Mets).is_err());
    }

    #[test]
    fn missing_file_owner_is_rejected() {
        let doc = SAMPLE.replace(r#" OWNERID="E""#, "");
        assert!(validate(doc.as_bytes(), DocumentFormat::Mets).is_err());
    }

    #[test]
    fn unknown_struct_map_is_rejected() {
        let doc = SAMPLE.replace(r#"STRUCTID="S1""#, r#"STRUCTID="S2""#);
        assert!(validate(doc.as_bytes(), DocumentFormat::Mets).is_err());
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(validate(b"", DocumentFormat::Mets).is_err());
    }

    #[test]
    fn inline_content_is_not_interpreted() {
        let doc = SAMPLE.replace("<dc:title>", "<dc:title><anything><nested/></anything>");
        validate(doc.as_bytes(), DocumentFormat::Mets).unwrap();
    }
}
