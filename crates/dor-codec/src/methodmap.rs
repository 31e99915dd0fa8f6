//! `METHODMAP` datastream parsing.
//!
//! Behavior definitions and mechanisms both carry a method map. A
//! definition's map declares abstract methods and their user parameters;
//! a mechanism's map additionally names the service address, protocol,
//! per-method operation template, datastream inputs and return types.
//!
//! ```xml
//! <fmm:MethodMap xmlns:fmm="http://fedora.comm.nsdlib.org/service/methodmap"
//!     bDefPID="demo:1" serviceBaseURL="http://images.example.org/" protocol="HTTP">
//!   <fmm:Method operationName="getThumbnail" operationLabel="Thumbnail"
//!       operationLocation="thumb?img=(IMAGE)&amp;size=(size)">
//!     <fmm:UserInputParm parmName="size" defaultValue="thumb" required="false">
//!       <fmm:ValidParmValues><fmm:ValidParm value="thumb"/><fmm:ValidParm value="full"/></fmm:ValidParmValues>
//!     </fmm:UserInputParm>
//!     <fmm:DatastreamInputParm parmName="IMAGE" passBy="URL_REF" required="true"/>
//!     <fmm:MethodReturnType wsdlMsgTOMIME="image/jpeg"/>
//!   </fmm:Method>
//! </fmm:MethodMap>
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use dor_types::{
    BehaviorSpec, MechanismMethod, MechanismSpec, MethodDef, MethodParmDef, ParmKind, PassBy, Pid,
    Protocol,
};

use crate::error::{CodecError, Result};

/// A parsed method map, before it is viewed as a definition or mechanism.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodMap {
    pub bdef_pid: Option<Pid>,
    pub service_address: Option<String>,
    pub protocol: Option<String>,
    pub methods: Vec<MappedMethod>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappedMethod {
    pub def: MethodDef,
    pub operation_location: Option<String>,
    pub return_mime_types: Vec<String>,
}

impl MethodMap {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.check_end_names(true);

        let mut map = MethodMap::default();
        let mut seen_root = false;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let e = match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => e,
                Event::Eof => break,
                _ => continue,
            };
            match e.local_name().as_ref() {
                b"MethodMap" => {
                    seen_root = true;
                    map.bdef_pid = attr(&e, "bDefPID")?.map(|p| Pid::parse(&p)).transpose()?;
                    map.service_address = attr(&e, "serviceBaseURL")?;
                    map.protocol = attr(&e, "protocol")?;
                }
                b"Method" => {
                    let name = attr(&e, "operationName")?
                        .ok_or_else(|| CodecError::integrity("Method is missing operationName"))?;
                    map.methods.push(MappedMethod {
                        def: MethodDef {
                            name,
                            label: attr(&e, "operationLabel")?.unwrap_or_default(),
                            parms: Vec::new(),
                        },
                        operation_location: attr(&e, "operationLocation")?,
                        return_mime_types: Vec::new(),
                    });
                }
                b"UserInputParm" => push_parm(&mut map, &e, ParmKind::User)?,
                b"DatastreamInputParm" => push_parm(&mut map, &e, ParmKind::Datastream)?,
                b"DefaultInputParm" => push_parm(&mut map, &e, ParmKind::Default)?,
                b"ValidParm" => {
                    let value = attr(&e, "value")?
                        .ok_or_else(|| CodecError::integrity("ValidParm is missing value"))?;
                    let parm = map
                        .methods
                        .last_mut()
                        .and_then(|m| m.def.parms.last_mut())
                        .ok_or_else(|| CodecError::integrity("ValidParm outside a parameter"))?;
                    parm.domain.push(value);
                }
                b"MethodReturnType" => {
                    let method = map
                        .methods
                        .last_mut()
                        .ok_or_else(|| CodecError::integrity("MethodReturnType outside a Method"))?;
                    if let Some(mimes) = attr(&e, "wsdlMsgTOMIME")? {
                        method
                            .return_mime_types
                            .extend(mimes.split_whitespace().map(str::to_string));
                    }
                }
                _ => {}
            }
        }
        if !seen_root {
            return Err(CodecError::integrity("method map has no MethodMap element"));
        }
        Ok(map)
    }

    /// View as a behavior definition: abstract methods with user parameters.
    pub fn into_behavior_spec(self) -> BehaviorSpec {
        BehaviorSpec {
            bdef_pid: self.bdef_pid,
            methods: self
                .methods
                .into_iter()
                .map(|m| MethodDef {
                    parms: m.def.parms.into_iter().filter(|p| p.kind == ParmKind::User).collect(),
                    ..m.def
                })
                .collect(),
        }
    }

    /// View as a mechanism. Every method needs an operation location.
    pub fn into_mechanism_spec(self) -> Result<MechanismSpec> {
        let methods = self
            .methods
            .into_iter()
            .map(|m| {
                let operation_location = m.operation_location.ok_or_else(|| {
                    CodecError::integrity(format!("method {} has no operationLocation", m.def.name))
                })?;
                Ok(MechanismMethod {
                    def: m.def,
                    operation_location,
                    return_mime_types: m.return_mime_types,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MechanismSpec {
            bdef_pid: self.bdef_pid,
            address: self.service_address.unwrap_or_default(),
            protocol: self
                .protocol
                .as_deref()
                .map(Protocol::parse)
                .unwrap_or(Protocol::Http),
            methods,
        })
    }
}

fn push_parm(map: &mut MethodMap, e: &BytesStart<'_>, kind: ParmKind) -> Result<()> {
    let name = attr(e, "parmName")?
        .ok_or_else(|| CodecError::integrity("parameter is missing parmName"))?;
    let pass_by = match attr(e, "passBy")?.as_deref() {
        Some("URL_REF") => PassBy::UrlRef,
        _ => PassBy::Value,
    };
    let required = attr(e, "required")?
        .map(|r| r.eq_ignore_ascii_case("true"))
        .unwrap_or(kind == ParmKind::Datastream);
    let parm = MethodParmDef {
        label: attr(e, "label")?.unwrap_or_else(|| name.clone()),
        name,
        default_value: attr(e, "defaultValue")?,
        required,
        domain: Vec::new(),
        kind,
        pass_by,
    };
    let method = map
        .methods
        .last_mut()
        .ok_or_else(|| CodecError::integrity("parameter outside a Method"))?;
    method.def.parms.push(parm);
    Ok(())
}

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a?;
        if a.key.as_ref() == name.as_bytes() {
            let value = a.unescape_value()?.into_owned();
            return Ok((!value.is_empty()).then_some(value));
        }
    }
    Ok(None)
}
