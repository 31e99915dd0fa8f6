//! Dublin Core descriptive metadata helpers.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use dor_types::Pid;

use crate::error::{CodecError, Result};
use crate::escape::xml_escape;

pub const OAI_DC_NS: &str = "http://www.openarchives.org/OAI/2.0/oai_dc/";
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

/// Element values read from a Dublin Core record, keyed by local name
/// (`title`, `identifier`, `creator`, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DcRecord {
    pub elements: BTreeMap<String, Vec<String>>,
}

impl DcRecord {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.check_end_names(true);

        let mut record = DcRecord::default();
        let mut depth = 0usize;
        let mut current: Option<String> = None;
        let mut text = String::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    depth += 1;
                    if depth == 2 {
                        current = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                        text.clear();
                    }
                }
                Event::Text(t) if current.is_some() => text.push_str(&t.unescape()?),
                Event::CData(c) if current.is_some() => {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
                Event::End(_) => {
                    if depth == 2 {
                        if let Some(name) = current.take() {
                            record
                                .elements
                                .entry(name)
                                .or_default()
                                .push(text.trim().to_string());
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(record)
    }

    pub fn values(&self, element: &str) -> &[String] {
        self.elements.get(element).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn titles(&self) -> &[String] {
        self.values("title")
    }

    pub fn identifiers(&self) -> &[String] {
        self.values("identifier")
    }
}

/// A fresh record with `label` as its title and `pid` as its identifier.
pub fn default_dc(label: &str, pid: &Pid) -> Vec<u8> {
    format!(
        "<oai_dc:dc xmlns:oai_dc=\"{OAI_DC_NS}\" xmlns:dc=\"{DC_NS}\">\
         <dc:title>{}</dc:title>\
         <dc:identifier>{}</dc:identifier>\
         </oai_dc:dc>",
        xml_escape(label),
        xml_escape(pid.as_str()),
    )
    .into_bytes()
}

/// Make sure `pid` is among the record's identifiers.
///
/// Returns `None` when it already is; otherwise the record with a
/// `dc:identifier` appended just before the root's end tag.
pub fn ensure_identifier(bytes: &[u8], pid: &Pid) -> Result<Option<Vec<u8>>> {
    let record = DcRecord::parse(bytes)?;
    if record.identifiers().iter().any(|i| i == pid.as_str()) {
        return Ok(None);
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|e| CodecError::integrity(format!("DC is not UTF-8: {e}")))?;
    let trimmed = text.trim_end();
    let insert_at = trimmed
        .rfind("</")
        .ok_or_else(|| CodecError::integrity("DC record has no root end tag"))?;
    let mut out = String::with_capacity(text.len() + 64);
    out.push_str(&text[..insert_at]);
    out.push_str("<dc:identifier>");
    out.push_str(&xml_escape(pid.as_str()));
    out.push_str("</dc:identifier>");
    out.push_str(&text[insert_at..]);
    Ok(Some(out.into_bytes()))
}
