use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::temporal::Timestamp;

/// Location prefix marking content parked in the upload staging store.
pub const STAGING_PREFIX: &str = "uploaded://";

/// Location prefix marking a copy of content already held internally.
pub const COPY_PREFIX: &str = "copy://";

// ---------------------------------------------------------------------------
// ControlGroup
// ---------------------------------------------------------------------------

/// How a datastream's content is held.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlGroup {
    /// Inline XML, stored inside the object document itself.
    InlineXml,
    /// Bytes held in the repository's datastream store.
    ManagedContent,
    /// Bytes held elsewhere, referenced by URL.
    ExternalReference,
}

impl ControlGroup {
    pub fn code(&self) -> char {
        match self {
            Self::InlineXml => 'X',
            Self::ManagedContent => 'M',
            Self::ExternalReference => 'E',
        }
    }

    pub fn from_code(code: &str) -> Result<Self, TypeError> {
        match code {
            "X" => Ok(Self::InlineXml),
            "M" => Ok(Self::ManagedContent),
            "E" => Ok(Self::ExternalReference),
            other => Err(TypeError::InvalidCode {
                kind: "control group",
                code: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ControlGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// ComponentState
// ---------------------------------------------------------------------------

/// State of a datastream or disseminator version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentState {
    #[default]
    Active,
    Inactive,
    Deleted,
}

impl ComponentState {
    pub fn code(&self) -> char {
        match self {
            Self::Active => 'A',
            Self::Inactive => 'I',
            Self::Deleted => 'D',
        }
    }

    pub fn from_code(code: &str) -> Result<Self, TypeError> {
        match code {
            "A" => Ok(Self::Active),
            "I" => Ok(Self::Inactive),
            "D" => Ok(Self::Deleted),
            other => Err(TypeError::InvalidCode {
                kind: "component state",
                code: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MdClass
// ---------------------------------------------------------------------------

/// Metadata class of an inline XML datastream; decides which document
/// region the datastream is written to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MdClass {
    Descriptive,
    Technical,
    Rights,
    Source,
    Provenance,
}

impl MdClass {
    /// Element name of a version of this class inside its section.
    pub fn element_name(&self) -> &'static str {
        match self {
            Self::Descriptive => "descMD",
            Self::Technical => "techMD",
            Self::Rights => "rightsMD",
            Self::Source => "sourceMD",
            Self::Provenance => "digiprovMD",
        }
    }

    pub fn from_element_name(name: &str) -> Option<Self> {
        match name {
            "descMD" => Some(Self::Descriptive),
            "techMD" => Some(Self::Technical),
            "rightsMD" => Some(Self::Rights),
            "sourceMD" => Some(Self::Source),
            "digiprovMD" => Some(Self::Provenance),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Location classification
// ---------------------------------------------------------------------------

/// What a datastream location string points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocationKind {
    /// An id in the repository's datastream store.
    Internal,
    /// An `http(s)://` URL.
    External,
    /// An id in the upload staging store.
    Staging,
    /// A reference to existing internal content that must be copied.
    CopyOf,
}

impl LocationKind {
    pub fn classify(location: &str) -> Self {
        if location.starts_with(STAGING_PREFIX) {
            Self::Staging
        } else if location.starts_with(COPY_PREFIX) {
            Self::CopyOf
        } else if location.starts_with("http://") || location.starts_with("https://") {
            Self::External
        } else {
            Self::Internal
        }
    }
}

// ---------------------------------------------------------------------------
// Datastream
// ---------------------------------------------------------------------------

/// Inline XML content of an `X` datastream version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineXml {
    pub md_class: MdClass,
    /// The METS `MDTYPE` attribute (e.g. "DC", "OTHER").
    pub md_type: String,
    /// Exact bytes of the inline XML, including namespace prefixes.
    pub content: Vec<u8>,
}

/// One version of a datastream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datastream {
    pub id: String,
    pub version_id: String,
    pub control_group: ControlGroup,
    pub label: String,
    pub mime_type: String,
    pub state: Option<ComponentState>,
    pub created: Option<Timestamp>,
    /// Internal id, external URL, or staging reference. `None` for inline XML.
    pub location: Option<String>,
    /// Size in bytes; `None` when unknown.
    pub size: Option<u64>,
    pub metadata_ids: Vec<String>,
    pub audit_record_ids: Vec<String>,
    pub xml: Option<InlineXml>,
}

impl Datastream {
    /// A new inline XML version.
    pub fn inline_xml(
        id: impl Into<String>,
        version_id: impl Into<String>,
        md_class: MdClass,
        label: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            version_id: version_id.into(),
            control_group: ControlGroup::InlineXml,
            label: label.into(),
            mime_type: "text/xml".into(),
            state: None,
            created: None,
            location: None,
            size: Some(content.len() as u64),
            metadata_ids: Vec::new(),
            audit_record_ids: Vec::new(),
            xml: Some(InlineXml {
                md_class,
                md_type: "OTHER".into(),
                content,
            }),
        }
    }

    /// A new managed or external version pointing at `location`.
    pub fn referenced(
        id: impl Into<String>,
        version_id: impl Into<String>,
        control_group: ControlGroup,
        label: impl Into<String>,
        mime_type: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            version_id: version_id.into(),
            control_group,
            label: label.into(),
            mime_type: mime_type.into(),
            state: None,
            created: None,
            location: Some(location.into()),
            size: None,
            metadata_ids: Vec::new(),
            audit_record_ids: Vec::new(),
            xml: None,
        }
    }

    pub fn effective_state(&self) -> ComponentState {
        self.state.unwrap_or_default()
    }

    pub fn location_kind(&self) -> Option<LocationKind> {
        self.location.as_deref().map(LocationKind::classify)
    }

    /// The inline XML bytes, if this is an `X` version.
    pub fn xml_content(&self) -> Option<&[u8]> {
        self.xml.as_ref().map(|x| x.content.as_slice())
    }

    /// Id under which managed content of this version is persisted.
    pub fn managed_content_id(&self, pid: &crate::Pid) -> String {
        format!("{pid}+{}+{}", self.id, self.version_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_group_codes() {
        for cg in [
            ControlGroup::InlineXml,
            ControlGroup::ManagedContent,
            ControlGroup::ExternalReference,
        ] {
            let code = cg.code().to_string();
            assert_eq!(ControlGroup::from_code(&code).unwrap(), cg);
        }
        assert!(ControlGroup::from_code("R").is_err());
    }

    #[test]
    fn location_classification() {
        assert_eq!(LocationKind::classify("uploaded://42"), LocationKind::Staging);
        assert_eq!(LocationKind::classify("copy://demo:1+IMG+IMG.0"), LocationKind::CopyOf);
        assert_eq!(LocationKind::classify("https://example.org/a.jpg"), LocationKind::External);
        assert_eq!(LocationKind::classify("demo:1+IMG+IMG.0"), LocationKind::Internal);
    }

    #[test]
    fn managed_content_id_is_derived() {
        let pid = crate::Pid::parse("demo:1").unwrap();
        let ds = Datastream::referenced(
            "IMG",
            "IMG.2",
            ControlGroup::ManagedContent,
            "image",
            "image/jpeg",
            "uploaded://abc",
        );
        assert_eq!(ds.managed_content_id(&pid), "demo:1+IMG+IMG.2");
    }

    #[test]
    fn inline_xml_sets_size() {
        let ds = Datastream::inline_xml("DC", "DC1.0", MdClass::Descriptive, "dc", b"<a/>".to_vec());
        assert_eq!(ds.size, Some(4));
        assert_eq!(ds.xml_content(), Some(&b"<a/>"[..]));
        assert_eq!(ds.effective_state(), ComponentState::Active);
    }
}
