//! Turning a method call on an object into a byte stream.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use dor_session::{Reader, ReaderTier, RepositoryError, RepositoryResult, SessionManager};
use dor_types::stream::REDIRECT_MIME_TYPE;
use dor_types::{
    ComponentState, DisseminationBindingInfo, MimeTypedStream, ObjectMethodsDef, Pid, Protocol,
    Timestamp,
};

use crate::binding::{binding_info, operation_url};
use crate::dynamic::{self, DynamicCall, DYNAMIC_BDEF, DYNAMIC_METHODS};
use crate::params::merge_parms;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// A method call resolved as far as the service URL, before anything is
/// fetched.
#[derive(Clone, Debug)]
pub struct ResolvedRequest {
    pub url: String,
    pub method: String,
    pub protocol: Protocol,
    pub return_mime_types: Vec<String>,
    pub parms: BTreeMap<String, String>,
    pub bindings: Vec<DisseminationBindingInfo>,
    /// Parameters that were sent empty for lack of a default.
    pub warnings: Vec<String>,
}

impl ResolvedRequest {
    pub fn is_redirect(&self) -> bool {
        self.return_mime_types.iter().any(|m| m == REDIRECT_MIME_TYPE)
    }
}

// ---------------------------------------------------------------------------
// DisseminationResolver
// ---------------------------------------------------------------------------

/// Resolves disseminations against the readers a [`SessionManager`] hands out.
pub struct DisseminationResolver {
    manager: Arc<SessionManager>,
}

impl DisseminationResolver {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Run `method` of behavior definition `bdef` on object `pid`.
    ///
    /// `bdef` may also name a disseminator id. Requests against
    /// [`DYNAMIC_BDEF`] are answered by the built-in handlers.
    pub fn resolve(
        &self,
        pid: &Pid,
        bdef: &str,
        method: &str,
        user_parms: &BTreeMap<String, String>,
        as_of: Option<&Timestamp>,
    ) -> RepositoryResult<MimeTypedStream> {
        let start = Instant::now();
        if bdef == DYNAMIC_BDEF {
            let handler = dynamic::find(method).ok_or_else(|| {
                RepositoryError::MethodNotFound(format!("{DYNAMIC_BDEF}/{method}"))
            })?;
            let reader = self.manager.get_reader(pid, ReaderTier::Fast)?;
            let stream = handler.invoke(&DynamicCall {
                resolver: self,
                reader: &reader,
                parms: user_parms,
                as_of,
            })?;
            debug!(%pid, method, elapsed_ms = start.elapsed().as_millis() as u64, "dynamic dissemination");
            return Ok(stream);
        }

        let request = self.resolve_request(pid, bdef, method, user_parms, as_of)?;
        if request.is_redirect() {
            info!(%pid, bdef, method, url = %request.url, "redirect dissemination");
            return Ok(MimeTypedStream::redirect(request.url));
        }
        if request.protocol != Protocol::Http {
            return Err(RepositoryError::GeneralException {
                kind: "UnsupportedProtocol".into(),
                message: format!(
                    "{method} of {bdef} uses protocol {}",
                    request.protocol.as_str()
                ),
            });
        }

        let fetched = self.manager.context().fetcher.fetch(&request.url)?;
        let mime_type = fetched
            .mime_type
            .or_else(|| request.return_mime_types.first().cloned())
            .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());
        info!(
            %pid,
            bdef,
            method,
            url = %request.url,
            bytes = fetched.bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "dissemination complete"
        );
        let mut stream = MimeTypedStream::new(mime_type, fetched.bytes);
        for warning in request.warnings {
            stream = stream.with_property("X-Parameter-Warning", warning);
        }
        Ok(stream)
    }

    /// Resolve a method call down to the service URL without fetching it.
    pub fn resolve_request(
        &self,
        pid: &Pid,
        bdef: &str,
        method: &str,
        user_parms: &BTreeMap<String, String>,
        as_of: Option<&Timestamp>,
    ) -> RepositoryResult<ResolvedRequest> {
        let reader = self.manager.get_reader(pid, ReaderTier::Fast)?;
        let diss = reader
            .disseminator_for(bdef, as_of)?
            .filter(|d| d.effective_state() != ComponentState::Deleted)
            .ok_or_else(|| {
                RepositoryError::MethodNotFound(format!("{pid} has no disseminator for {bdef}"))
            })?;

        let mechanism = self
            .manager
            .get_bmech_reader(&diss.bmech_pid)?
            .mechanism_spec(as_of)?;
        let mech_method = mechanism.method(method).ok_or_else(|| {
            RepositoryError::MethodNotFound(format!(
                "{method} is not implemented by {}",
                diss.bmech_pid
            ))
        })?;

        let merged = merge_parms(&mech_method.def, user_parms)?;
        let bindings = binding_info(
            &reader,
            &diss,
            &mechanism,
            mech_method,
            &self.manager.context().config,
            as_of,
        )?;
        let url = operation_url(
            &mechanism.address,
            &mech_method.operation_location,
            &bindings,
            &merged.values,
        );
        debug!(%pid, diss = %diss.id, bmech = %diss.bmech_pid, %url, "resolved dissemination");

        Ok(ResolvedRequest {
            url,
            method: method.to_string(),
            protocol: mechanism.protocol.clone(),
            return_mime_types: mech_method.return_mime_types.clone(),
            parms: merged.values,
            bindings,
            warnings: merged.warnings,
        })
    }

    /// Every method `pid` exposes, grouped by behavior definition, with the
    /// built-in methods last.
    pub fn get_object_methods(
        &self,
        pid: &Pid,
        as_of: Option<&Timestamp>,
    ) -> RepositoryResult<Vec<ObjectMethodsDef>> {
        let reader = self.manager.get_reader(pid, ReaderTier::Fast)?;
        let mut methods = self.disseminated_methods(&reader, as_of)?;

        let dynamic_bdef = Pid::parse(DYNAMIC_BDEF)?;
        methods.extend(DYNAMIC_METHODS.iter().map(|m| ObjectMethodsDef {
            pid: pid.clone(),
            bdef_pid: dynamic_bdef.clone(),
            method_name: m.name.to_string(),
            parms: m.def().parms,
            as_of: as_of.copied(),
        }));
        Ok(methods)
    }

    fn disseminated_methods(
        &self,
        reader: &Reader,
        as_of: Option<&Timestamp>,
    ) -> RepositoryResult<Vec<ObjectMethodsDef>> {
        let mut methods = Vec::new();
        for diss in reader.disseminators(as_of)? {
            if diss.effective_state() == ComponentState::Deleted {
                continue;
            }
            let defs = self
                .manager
                .get_bdef_reader(&diss.bdef_pid)?
                .list_methods(as_of)?;
            methods.extend(defs.into_iter().map(|def| ObjectMethodsDef {
                pid: reader.pid().clone(),
                bdef_pid: diss.bdef_pid.clone(),
                method_name: def.name,
                parms: def.parms,
                as_of: as_of.copied(),
            }));
        }
        Ok(methods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use dor_codec::{DocumentFormat, MetsSerializer};
    use dor_session::{RepositoryConfig, RepositoryContext};
    use dor_store::InMemoryContentFetcher;
    use dor_types::object::METHOD_MAP_DATASTREAM_ID;
    use dor_types::{
        ControlGroup, Datastream, DigitalObject, Disseminator, DsBinding, DsBindingMap, MdClass,
        ObjectKind,
    };

    const ENCODING: &str = "UTF-8";
    const IMAGE_URL: &str = "http://example.org/images/1225.jpg";
    const THUMB_URL: &str =
        "http://images.example.org/thumb?img=http%3A%2F%2Fexample.org%2Fimages%2F1225.jpg&size=thumb";

    const BDEF_MAP: &str = r#"<fmm:MethodMap xmlns:fmm="http://fedora.comm.nsdlib.org/service/methodmap">
      <fmm:Method operationName="getThumbnail" operationLabel="Thumbnail">
        <fmm:UserInputParm parmName="size" defaultValue="thumb" required="false">
          <fmm:ValidParmValues><fmm:ValidParm value="thumb"/><fmm:ValidParm value="full"/></fmm:ValidParmValues>
        </fmm:UserInputParm>
      </fmm:Method>
      <fmm:Method operationName="getCaption">
        <fmm:UserInputParm parmName="lang" required="true"/>
      </fmm:Method>
    </fmm:MethodMap>"#;

    const BMECH_MAP: &str = r#"<fmm:MethodMap xmlns:fmm="http://fedora.comm.nsdlib.org/service/methodmap"
        bDefPID="uva-bdef-image:1" serviceBaseURL="http://images.example.org/" protocol="HTTP">
      <fmm:Method operationName="getThumbnail" operationLocation="thumb?img=(IMAGE)&amp;size=(size)">
        <fmm:UserInputParm parmName="size" defaultValue="thumb" required="false">
          <fmm:ValidParmValues><fmm:ValidParm value="thumb"/><fmm:ValidParm value="full"/></fmm:ValidParmValues>
        </fmm:UserInputParm>
        <fmm:DatastreamInputParm parmName="IMAGE" passBy="URL_REF" required="true"/>
        <fmm:MethodReturnType wsdlMsgTOMIME="image/jpeg"/>
      </fmm:Method>
      <fmm:Method operationName="getCaption" operationLocation="caption?img=(IMAGE)&amp;lang=(lang)">
        <fmm:UserInputParm parmName="lang" required="true"/>
        <fmm:DatastreamInputParm parmName="IMAGE" passBy="URL_REF" required="true"/>
        <fmm:MethodReturnType wsdlMsgTOMIME="application/fedora-redirect"/>
      </fmm:Method>
    </fmm:MethodMap>"#;

    fn pid(s: &str) -> Pid {
        Pid::parse(s).unwrap()
    }

    struct Harness {
        resolver: DisseminationResolver,
        fetcher: Arc<InMemoryContentFetcher>,
    }

    fn ingest(manager: &SessionManager, object: &DigitalObject) {
        let bytes = MetsSerializer::new(ENCODING).unwrap().to_bytes(object).unwrap();
        let mut writer = manager
            .get_ingest_writer(&bytes, DocumentFormat::Mets, ENCODING, false)
            .unwrap();
        manager.do_commit(&mut writer, "ingest", false).unwrap();
        manager.release_writer(writer);
    }

    fn behavior_object(p: &str, kind: ObjectKind, map: &str) -> DigitalObject {
        let mut obj = DigitalObject::new(pid(p), kind);
        obj.label = p.into();
        obj.add_datastream_version(Datastream::inline_xml(
            METHOD_MAP_DATASTREAM_ID,
            "METHODMAP.0",
            MdClass::Technical,
            "methods",
            map.as_bytes().to_vec(),
        ))
        .unwrap();
        obj
    }

    fn image_object() -> DigitalObject {
        let mut obj = DigitalObject::new(pid("uva-lib:1225"), ObjectKind::DataObject);
        obj.label = "Statue".into();
        obj.add_datastream_version(Datastream::referenced(
            "IMG", "IMG.0", ControlGroup::ExternalReference, "image", "image/jpeg", IMAGE_URL,
        ))
        .unwrap();
        obj.add_disseminator_version(Disseminator {
            id: "DISS1".into(),
            version_id: "DISS1.0".into(),
            bdef_pid: pid("uva-bdef-image:1"),
            bmech_pid: pid("uva-bmech-image:1"),
            binding_map_id: "S1".into(),
            label: "images".into(),
            state: None,
            created: None,
            binding_map: DsBindingMap {
                id: "S1".into(),
                mechanism_pid: pid("uva-bmech-image:1"),
                label: "images".into(),
                bindings: vec![DsBinding {
                    binding_key: "IMAGE".into(),
                    datastream_id: "IMG".into(),
                    label: "image".into(),
                    seq: 0,
                }],
            },
        })
        .unwrap();
        obj
    }

    fn harness() -> Harness {
        let fetcher = Arc::new(InMemoryContentFetcher::new());
        let ctx = RepositoryContext::in_memory(RepositoryConfig::default())
            .with_fetcher(fetcher.clone());
        let manager = Arc::new(SessionManager::new(ctx));
        ingest(&manager, &behavior_object("uva-bdef-image:1", ObjectKind::BehaviorDefinition, BDEF_MAP));
        ingest(&manager, &behavior_object("uva-bmech-image:1", ObjectKind::BehaviorMechanism, BMECH_MAP));
        ingest(&manager, &image_object());
        Harness {
            resolver: DisseminationResolver::new(manager),
            fetcher,
        }
    }

    fn parms(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn thumbnail_uses_declared_default_size() {
        let h = harness();
        let request = h
            .resolver
            .resolve_request(&pid("uva-lib:1225"), "DISS1", "getThumbnail", &BTreeMap::new(), None)
            .unwrap();
        assert!(request.url.contains("size=thumb"));
        assert_eq!(request.url, THUMB_URL);
        assert_eq!(request.bindings.len(), 1);
        assert_eq!(request.bindings[0].datastream_location, IMAGE_URL);

        h.fetcher.insert(THUMB_URL, "image/jpeg", &b"jpeg bytes"[..]);
        let stream = h
            .resolver
            .resolve(&pid("uva-lib:1225"), "uva-bdef-image:1", "getThumbnail", &BTreeMap::new(), None)
            .unwrap();
        assert_eq!(stream.mime_type, "image/jpeg");
        assert_eq!(&stream.bytes[..], b"jpeg bytes");
        assert_eq!(h.fetcher.requests(), vec![THUMB_URL.to_string()]);
    }

    #[test]
    fn caller_size_overrides_default() {
        let h = harness();
        let request = h
            .resolver
            .resolve_request(&pid("uva-lib:1225"), "DISS1", "getThumbnail", &parms(&[("size", "full")]), None)
            .unwrap();
        assert!(request.url.ends_with("size=full"));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let h = harness();
        let target = pid("uva-lib:1225");
        for (method, given) in [
            ("getThumbnail", parms(&[("size", "huge")])),
            ("getThumbnail", parms(&[("colour", "red")])),
            ("getCaption", BTreeMap::new()),
        ] {
            let err = h
                .resolver
                .resolve(&target, "uva-bdef-image:1", method, &given, None)
                .unwrap_err();
            assert!(matches!(err, RepositoryError::InvalidUserParm(_)), "{method}: {err}");
        }
        assert!(h.fetcher.requests().is_empty());
    }

    #[test]
    fn redirect_methods_return_the_url() {
        let h = harness();
        let stream = h
            .resolver
            .resolve(&pid("uva-lib:1225"), "DISS1", "getCaption", &parms(&[("lang", "en")]), None)
            .unwrap();
        assert!(stream.is_redirect());
        assert!(std::str::from_utf8(&stream.bytes).unwrap().ends_with("caption?img=http%3A%2F%2Fexample.org%2Fimages%2F1225.jpg&lang=en"));
        assert!(h.fetcher.requests().is_empty());
    }

    #[test]
    fn unknown_methods_and_behaviors() {
        let h = harness();
        let target = pid("uva-lib:1225");
        let none = BTreeMap::new();
        for (bdef, method) in [
            ("uva-bdef-image:1", "getPoster"),
            ("uva-bdef-other:1", "getThumbnail"),
            (DYNAMIC_BDEF, "reflect"),
        ] {
            let err = h.resolver.resolve(&target, bdef, method, &none, None).unwrap_err();
            assert!(matches!(err, RepositoryError::MethodNotFound(_)), "{bdef}/{method}: {err}");
        }
        let err = h
            .resolver
            .resolve(&pid("uva-lib:404"), "DISS1", "getThumbnail", &none, None)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ObjectNotFound(_)));
    }

    #[test]
    fn resolution_runs_from_the_fast_store() {
        let h = harness();
        let loads = h.resolver.manager().definitive().loads();
        h.resolver
            .resolve_request(&pid("uva-lib:1225"), "DISS1", "getThumbnail", &BTreeMap::new(), None)
            .unwrap();
        h.resolver.get_object_methods(&pid("uva-lib:1225"), None).unwrap();
        assert_eq!(h.resolver.manager().definitive().loads(), loads);
    }

    #[test]
    fn object_methods_include_builtins() {
        let h = harness();
        let methods = h.resolver.get_object_methods(&pid("uva-lib:1225"), None).unwrap();
        let names: Vec<_> = methods
            .iter()
            .map(|m| (m.bdef_pid.as_str(), m.method_name.as_str()))
            .collect();
        assert_eq!(&names[..2], &[("uva-bdef-image:1", "getThumbnail"), ("uva-bdef-image:1", "getCaption")]);
        assert!(names.contains(&(DYNAMIC_BDEF, "getItem")));
        assert_eq!(methods[0].parms[0].domain, vec!["thumb".to_string(), "full".to_string()]);
    }

    #[test]
    fn dynamic_handlers_answer_without_disseminators() {
        let h = harness();
        let target = pid("uva-lib:1225");
        let none = BTreeMap::new();

        let profile = h.resolver.resolve(&target, DYNAMIC_BDEF, "getObjectProfile", &none, None).unwrap();
        let profile = String::from_utf8(profile.bytes.to_vec()).unwrap();
        assert!(profile.contains("<objLabel>Statue</objLabel>"));
        assert!(profile.contains("<objType>FedoraObject</objType>"));

        let listing = h.resolver.resolve(&target, DYNAMIC_BDEF, "listDatastreams", &none, None).unwrap();
        assert_eq!(listing.mime_type, "text/xml");
        assert!(String::from_utf8(listing.bytes.to_vec()).unwrap().contains("dsid=\"IMG\""));

        let methods = h.resolver.resolve(&target, DYNAMIC_BDEF, "listMethods", &none, None).unwrap();
        assert!(String::from_utf8(methods.bytes.to_vec()).unwrap().contains("<method name=\"getThumbnail\">"));

        assert!(matches!(
            h.resolver.resolve(&target, DYNAMIC_BDEF, "getItem", &none, None),
            Err(RepositoryError::InvalidUserParm(_))
        ));
        h.fetcher.insert(IMAGE_URL, "image/jpeg", &b"full image"[..]);
        let item = h
            .resolver
            .resolve(&target, DYNAMIC_BDEF, "getItem", &parms(&[("itemID", "IMG")]), None)
            .unwrap();
        assert_eq!(item.mime_type, "image/jpeg");
        assert_eq!(&item.bytes[..], b"full image");
    }
}
