use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::datastream::{ComponentState, ControlGroup};
use crate::method::{MethodParmDef, Protocol};
use crate::temporal::Timestamp;

/// MIME type signalling that the stream body is a URL the caller should
/// follow rather than proxy.
pub const REDIRECT_MIME_TYPE: &str = "application/fedora-redirect";

/// A header-style name/value pair attached to a stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

/// Result of a dissemination: a MIME type, the body, and optional headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MimeTypedStream {
    pub mime_type: String,
    pub bytes: Bytes,
    pub properties: Vec<Property>,
}

impl MimeTypedStream {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes: bytes.into(),
            properties: Vec::new(),
        }
    }

    /// A redirect stream whose body is `url`.
    pub fn redirect(url: impl Into<String>) -> Self {
        Self::new(REDIRECT_MIME_TYPE, Bytes::from(url.into()))
    }

    pub fn is_redirect(&self) -> bool {
        self.mime_type == REDIRECT_MIME_TYPE
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push(Property {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

/// Runtime tuple resolved for one binding of a dissemination. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisseminationBindingInfo {
    pub binding_key: String,
    pub datastream_id: String,
    pub datastream_version_id: String,
    pub datastream_location: String,
    pub control_group: ControlGroup,
    pub datastream_state: ComponentState,
    pub datastream_created: Option<Timestamp>,
    pub mime_type: String,
    pub address_location: String,
    pub operation_location: String,
    pub protocol: Protocol,
    pub method_parms: Vec<MethodParmDef>,
}
