//! `RELS-EXT` relationship parsing.
//!
//! The datastream is a single RDF description of the object itself:
//!
//! ```xml
//! <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
//!          xmlns:rel="info:fedora/fedora-system:def/relations-external#">
//!   <rdf:Description rdf:about="info:fedora/demo:1">
//!     <rel:isMemberOf rdf:resource="info:fedora/demo:c1"/>
//!   </rdf:Description>
//! </rdf:RDF>
//! ```

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use dor_types::{Pid, Triple};

use crate::error::{CodecError, Result};

/// Subject and statements of a relationship datastream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationships {
    pub subject: String,
    pub triples: Vec<Triple>,
}

struct PendingPredicate {
    predicate: String,
    resource: Option<String>,
    text: String,
}

impl Relationships {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.check_end_names(true);

        let mut namespaces: HashMap<String, String> = HashMap::new();
        let mut subject: Option<String> = None;
        let mut triples = Vec::new();
        let mut pending: Option<PendingPredicate> = None;
        let mut depth = 0usize;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    depth += 1;
                    element(&e, depth, &mut namespaces, &mut subject, &mut pending)?;
                }
                Event::Empty(e) => {
                    element(&e, depth + 1, &mut namespaces, &mut subject, &mut pending)?;
                    if let Some(p) = pending.take() {
                        triples.push(finish(p, subject.as_deref())?);
                    }
                }
                Event::Text(t) => {
                    if let Some(p) = pending.as_mut() {
                        p.text.push_str(&t.unescape()?);
                    }
                }
                Event::End(_) => {
                    if depth == 3 {
                        if let Some(p) = pending.take() {
                            triples.push(finish(p, subject.as_deref())?);
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let subject = subject.ok_or_else(|| CodecError::integrity("RELS-EXT has no rdf:Description"))?;
        Ok(Self { subject, triples })
    }

    /// Fail unless the description is about `pid`.
    pub fn check_subject(&self, pid: &Pid) -> Result<()> {
        if self.subject == pid.to_uri() {
            Ok(())
        } else {
            Err(CodecError::integrity(format!(
                "RELS-EXT subject {} does not match {}",
                self.subject,
                pid.to_uri()
            )))
        }
    }
}

fn element(
    e: &BytesStart<'_>,
    depth: usize,
    namespaces: &mut HashMap<String, String>,
    subject: &mut Option<String>,
    pending: &mut Option<PendingPredicate>,
) -> Result<()> {
    let mut about = None;
    let mut resource = None;
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        let value = attr.unescape_value()?.into_owned();
        if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            namespaces.insert(String::from_utf8_lossy(prefix).into_owned(), value);
        } else if key == b"xmlns" {
            namespaces.insert(String::new(), value);
        } else {
            match attr.key.local_name().as_ref() {
                b"about" => about = Some(value),
                b"resource" => resource = Some(value),
                _ => {}
            }
        }
    }

    match depth {
        1 => {
            if e.local_name().as_ref() != b"RDF" {
                return Err(CodecError::integrity("RELS-EXT root must be rdf:RDF"));
            }
        }
        2 => {
            if e.local_name().as_ref() != b"Description" {
                return Err(CodecError::integrity("expected rdf:Description"));
            }
            if subject.is_some() {
                return Err(CodecError::integrity("RELS-EXT has more than one rdf:Description"));
            }
            *subject = Some(about.ok_or_else(|| CodecError::integrity("rdf:Description has no rdf:about"))?);
        }
        3 => {
            let name = e.name();
            let prefix = name.prefix().map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
            let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
            let ns = namespaces
                .get(prefix.as_deref().unwrap_or(""))
                .cloned()
                .unwrap_or_default();
            *pending = Some(PendingPredicate {
                predicate: format!("{ns}{local}"),
                resource,
                text: String::new(),
            });
        }
        _ => {}
    }
    Ok(())
}

fn finish(p: PendingPredicate, subject: Option<&str>) -> Result<Triple> {
    let subject = subject.ok_or_else(|| CodecError::integrity("statement outside rdf:Description"))?;
    Ok(match p.resource {
        Some(resource) => Triple::resource(subject, p.predicate, resource),
        None => Triple::literal(subject, p.predicate, p.text.trim()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dor_types::TripleObject;

    const RELS: &str = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
        xmlns:rel="info:fedora/fedora-system:def/relations-external#"
        xmlns:my="urn:my#">
      <rdf:Description rdf:about="info:fedora/demo:1">
        <rel:isMemberOf rdf:resource="info:fedora/demo:c1"/>
        <my:note>hello &amp; bye</my:note>
      </rdf:Description>
    </rdf:RDF>"#;

    #[test]
    fn parses_statements() {
        let rels = Relationships::parse(RELS.as_bytes()).unwrap();
        assert_eq!(rels.subject, "info:fedora/demo:1");
        assert_eq!(rels.triples.len(), 2);
        assert_eq!(
            rels.triples[0].predicate,
            "info:fedora/fedora-system:def/relations-external#isMemberOf"
        );
        assert_eq!(rels.triples[0].object, TripleObject::Resource("info:fedora/demo:c1".into()));
        assert_eq!(rels.triples[1].predicate, "urn:my#note");
        assert_eq!(rels.triples[1].object, TripleObject::Literal("hello & bye".into()));
    }

    #[test]
    fn subject_must_match_pid() {
        let rels = Relationships::parse(RELS.as_bytes()).unwrap();
        rels.check_subject(&Pid::parse("demo:1").unwrap()).unwrap();
        assert!(rels.check_subject(&Pid::parse("demo:2").unwrap()).is_err());
    }

    #[test]
    fn missing_description_is_rejected() {
        let doc = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"/>"#;
        assert!(Relationships::parse(doc.as_bytes()).is_err());
    }

    #[test]
    fn malformed_xml_is_rejected() {
        assert!(Relationships::parse(b"<rdf:RDF><rdf:Description></rdf:RDF>").is_err());
    }
}
