//! Methods every object answers without a disseminator.
//!
//! Requests against [`DYNAMIC_BDEF`] are dispatched through a fixed
//! name-to-handler table instead of a mechanism.

use std::collections::BTreeMap;

use dor_codec::xml_escape;
use dor_session::{Reader, RepositoryError, RepositoryResult};
use dor_types::{format_timestamp, MethodDef, MethodParmDef, MimeTypedStream, Timestamp};

use crate::resolver::DisseminationResolver;

/// Behavior definition id of the built-in methods.
pub const DYNAMIC_BDEF: &str = "fedora-system:3";

const XML: &str = "text/xml";

/// Everything a built-in method gets to work with.
pub struct DynamicCall<'a> {
    pub resolver: &'a DisseminationResolver,
    pub reader: &'a Reader,
    pub parms: &'a BTreeMap<String, String>,
    pub as_of: Option<&'a Timestamp>,
}

type Handler = fn(&DynamicCall<'_>) -> RepositoryResult<MimeTypedStream>;

/// One built-in method.
pub struct DynamicMethod {
    pub name: &'static str,
    pub label: &'static str,
    /// Required user parameters.
    pub parms: &'static [&'static str],
    handler: Handler,
}

impl DynamicMethod {
    pub fn def(&self) -> MethodDef {
        MethodDef {
            name: self.name.into(),
            label: self.label.into(),
            parms: self.parms.iter().map(|p| MethodParmDef::user(*p, true)).collect(),
        }
    }

    pub fn invoke(&self, call: &DynamicCall<'_>) -> RepositoryResult<MimeTypedStream> {
        for required in self.parms {
            if call.parms.get(*required).map_or(true, String::is_empty) {
                return Err(RepositoryError::InvalidUserParm(format!(
                    "method {} requires parameter {required}",
                    self.name
                )));
            }
        }
        if let Some(extra) = call.parms.keys().find(|k| !self.parms.contains(&k.as_str())) {
            return Err(RepositoryError::InvalidUserParm(format!(
                "method {} has no parameter {extra}",
                self.name
            )));
        }
        (self.handler)(call)
    }
}

pub static DYNAMIC_METHODS: &[DynamicMethod] = &[
    DynamicMethod {
        name: "listMethods",
        label: "List the methods this object exposes",
        parms: &[],
        handler: list_methods,
    },
    DynamicMethod {
        name: "listDatastreams",
        label: "List the datastreams of this object",
        parms: &[],
        handler: list_datastreams,
    },
    DynamicMethod {
        name: "getObjectProfile",
        label: "Describe this object",
        parms: &[],
        handler: object_profile,
    },
    DynamicMethod {
        name: "getItem",
        label: "Get the content of one datastream",
        parms: &["itemID"],
        handler: get_item,
    },
];

pub fn find(name: &str) -> Option<&'static DynamicMethod> {
    DYNAMIC_METHODS.iter().find(|m| m.name == name)
}

fn as_of_attr(as_of: Option<&Timestamp>) -> String {
    as_of
        .map(|t| format!(" asOfDateTime=\"{}\"", format_timestamp(t)))
        .unwrap_or_default()
}

fn list_methods(call: &DynamicCall<'_>) -> RepositoryResult<MimeTypedStream> {
    let methods = call.resolver.get_object_methods(call.reader.pid(), call.as_of)?;
    let mut out = format!(
        "<objectMethods pid=\"{}\"{}>",
        xml_escape(call.reader.pid().as_str()),
        as_of_attr(call.as_of)
    );
    let mut current_bdef: Option<String> = None;
    for m in &methods {
        if current_bdef.as_deref() != Some(m.bdef_pid.as_str()) {
            if current_bdef.is_some() {
                out.push_str("</bDef>");
            }
            out.push_str(&format!("<bDef pid=\"{}\">", xml_escape(m.bdef_pid.as_str())));
            current_bdef = Some(m.bdef_pid.to_string());
        }
        out.push_str(&format!("<method name=\"{}\">", xml_escape(&m.method_name)));
        for p in &m.parms {
            out.push_str(&format!(
                "<parm parmName=\"{}\" parmDefaultValue=\"{}\" parmRequired=\"{}\" parmLabel=\"{}\">",
                xml_escape(&p.name),
                xml_escape(p.default_value.as_deref().unwrap_or_default()),
                p.required,
                xml_escape(&p.label)
            ));
            if !p.domain.is_empty() {
                out.push_str("<parmDomainValues>");
                for v in &p.domain {
                    out.push_str(&format!("<value>{}</value>", xml_escape(v)));
                }
                out.push_str("</parmDomainValues>");
            }
            out.push_str("</parm>");
        }
        out.push_str("</method>");
    }
    if current_bdef.is_some() {
        out.push_str("</bDef>");
    }
    out.push_str("</objectMethods>");
    Ok(MimeTypedStream::new(XML, out))
}

fn list_datastreams(call: &DynamicCall<'_>) -> RepositoryResult<MimeTypedStream> {
    let mut out = format!(
        "<objectDatastreams pid=\"{}\"{}>",
        xml_escape(call.reader.pid().as_str()),
        as_of_attr(call.as_of)
    );
    for ds in call.reader.datastreams(call.as_of)? {
        out.push_str(&format!(
            "<datastream dsid=\"{}\" label=\"{}\" mimeType=\"{}\"/>",
            xml_escape(&ds.id),
            xml_escape(&ds.label),
            xml_escape(&ds.mime_type)
        ));
    }
    out.push_str("</objectDatastreams>");
    Ok(MimeTypedStream::new(XML, out))
}

fn object_profile(call: &DynamicCall<'_>) -> RepositoryResult<MimeTypedStream> {
    let profile = call.reader.profile()?;
    let date = |t: Option<Timestamp>| t.as_ref().map(format_timestamp).unwrap_or_default();
    let out = format!(
        "<objectProfile pid=\"{}\"{}>\
         <objLabel>{}</objLabel>\
         <objContentModel>{}</objContentModel>\
         <objType>{}</objType>\
         <objState>{}</objState>\
         <objCreateDate>{}</objCreateDate>\
         <objLastModDate>{}</objLastModDate>\
         </objectProfile>",
        xml_escape(profile.pid.as_str()),
        as_of_attr(call.as_of),
        xml_escape(&profile.label),
        xml_escape(profile.content_model.as_deref().unwrap_or_default()),
        profile.kind.document_type(),
        profile.state.code(),
        date(profile.created),
        date(profile.last_modified),
    );
    Ok(MimeTypedStream::new(XML, out))
}

fn get_item(call: &DynamicCall<'_>) -> RepositoryResult<MimeTypedStream> {
    let id = call.parms.get("itemID").map(String::as_str).unwrap_or_default();
    let ds = call.reader.datastream(id, call.as_of)?;
    let bytes = call.reader.datastream_content(id, call.as_of)?;
    Ok(MimeTypedStream::new(ds.mime_type, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_builtin_methods() {
        let names: Vec<_> = DYNAMIC_METHODS.iter().map(|m| m.name).collect();
        assert_eq!(names, ["listMethods", "listDatastreams", "getObjectProfile", "getItem"]);
        assert!(find("getItem").is_some());
        assert!(find("reflect").is_none());
    }

    #[test]
    fn get_item_declares_required_item_id() {
        let def = find("getItem").unwrap().def();
        assert_eq!(def.parms.len(), 1);
        assert!(def.parms[0].required);
        assert_eq!(def.parms[0].name, "itemID");
    }
}
