//! Parser states and partially built entities.
//!
//! The deserializer keeps two stacks: one [`ParseState`] per open element,
//! and one [`Partial`] per entity whose element is still open. States are
//! derived purely from the parent state and the child's local name by
//! [`transition`], which keeps the region grammar in one place.

use dor_types::{
    AuditRecord, ComponentState, ControlGroup, DsBinding, MdClass, Timestamp,
};

/// Text-bearing children of an audit record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditField {
    Process,
    Action,
    ComponentId,
    Responsibility,
    Date,
    Justification,
}

impl AuditField {
    pub fn from_local_name(name: &str) -> Option<Self> {
        match name {
            "process" => Some(Self::Process),
            "action" => Some(Self::Action),
            "componentID" => Some(Self::ComponentId),
            "responsibility" => Some(Self::Responsibility),
            "date" => Some(Self::Date),
            "justification" => Some(Self::Justification),
            _ => None,
        }
    }

    pub fn local_name(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Action => "action",
            Self::ComponentId => "componentID",
            Self::Responsibility => "responsibility",
            Self::Date => "date",
            Self::Justification => "justification",
        }
    }
}

/// Where the parser is in the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseState {
    /// Before the root element.
    Start,
    /// Directly inside the root element.
    Document,
    Header,

    // ---- Audit trail ----
    AuditSection,
    AuditEntry,
    AuditWrap,
    AuditData,
    Record,
    AuditText(AuditField),

    // ---- Inline XML metadata ----
    MetadataSection,
    MetadataVersion,
    MetadataWrap,
    /// Inside `xmlData`; every nested event is re-emitted verbatim.
    /// `depth` counts open elements below `xmlData`.
    InlineXml { depth: usize },

    // ---- Referenced content ----
    FileSection,
    FileGroups,
    FileGroup,
    File,
    FileLocation,
    FileContent,
    BinData,

    // ---- Disseminators ----
    StructMap,
    BindingMap,
    Binding,
    BindingPointer,
    BehaviorSection,
    InterfaceDef,
    Mechanism,

    /// An element the repository does not interpret; its subtree is skipped.
    Skip,
}

/// Compute the state entered when an element named `local` opens while in
/// `state`. `audit_section` tells an `amdSec` holding the audit trail apart
/// from one holding metadata. Returns `None` when the element is not
/// allowed at this position.
pub fn transition(state: ParseState, local: &str, audit_section: bool) -> Option<ParseState> {
    use ParseState::*;

    let next = match (state, local) {
        (Start, "mets") => Document,
        (Start, _) => return None,

        (Document, "metsHdr") => Header,
        (Document, "amdSec") if audit_section => AuditSection,
        (Document, "amdSec" | "dmdSecFedora") => MetadataSection,
        (Document, "fileSec") => FileSection,
        (Document, "structMap") => StructMap,
        (Document, "behaviorSec") => BehaviorSection,
        (Document, _) => Skip,
        (Header, _) => Skip,

        (AuditSection, "digiprovMD") => AuditEntry,
        (AuditEntry, "mdWrap") => AuditWrap,
        (AuditWrap, "xmlData") => AuditData,
        (AuditData, "record") => Record,
        (Record, name) => match self::AuditField::from_local_name(name) {
            Some(field) => AuditText(field),
            None => Skip,
        },
        (AuditSection | AuditEntry | AuditWrap | AuditData, _) => return None,
        (AuditText(_), _) => return None,

        (MetadataSection, name) if MdClass::from_element_name(name).is_some() => MetadataVersion,
        (MetadataSection, _) => return None,
        (MetadataVersion, "mdWrap") => MetadataWrap,
        (MetadataVersion, _) => return None,
        (MetadataWrap, "xmlData") => InlineXml { depth: 0 },
        (MetadataWrap, _) => Skip,
        (InlineXml { depth }, _) => InlineXml { depth: depth + 1 },

        (FileSection, "fileGrp") => FileGroups,
        (FileGroups, "fileGrp") => FileGroup,
        (FileGroup, "file") => File,
        (File, "FLocat") => FileLocation,
        (File, "FContent") => FileContent,
        (FileContent, "binData") => BinData,
        (FileSection | FileGroups | FileGroup | File | FileContent, _) => return None,
        (FileLocation | BinData, _) => return None,

        (StructMap, "div") => BindingMap,
        (BindingMap, "div") => Binding,
        (Binding, "fptr") => BindingPointer,
        (StructMap | BindingMap | Binding | BindingPointer, _) => return None,

        (BehaviorSection, "interfaceDef") => InterfaceDef,
        (BehaviorSection, "mechanism") => Mechanism,
        (BehaviorSection, _) => Skip,
        (InterfaceDef | Mechanism, _) => Skip,

        (Skip, _) => Skip,
    };
    Some(next)
}

// ---------------------------------------------------------------------------
// Partially built entities
// ---------------------------------------------------------------------------

/// A metadata section (`dmdSecFedora` or non-audit `amdSec`): one inline
/// XML datastream with its versions.
#[derive(Debug)]
pub struct SectionBuilder {
    pub id: String,
    pub state: Option<ComponentState>,
}

/// One version of an inline XML datastream.
#[derive(Debug)]
pub struct MetadataVersionBuilder {
    pub version_id: String,
    pub md_class: MdClass,
    pub created: Option<Timestamp>,
    pub label: String,
    pub mime_type: String,
    pub md_type: String,
    pub admids: Vec<String>,
    pub content: Vec<u8>,
    pub state: Option<ComponentState>,
}

/// An audit record being read field by field.
#[derive(Debug, Default)]
pub struct AuditBuilder {
    pub id: String,
    pub process_type: String,
    pub action: String,
    pub component_id: Option<String>,
    pub responsibility: String,
    pub date: String,
    pub justification: String,
}

impl AuditBuilder {
    pub fn field_mut(&mut self, field: AuditField) -> &mut String {
        match field {
            AuditField::Process => &mut self.process_type,
            AuditField::Action => &mut self.action,
            AuditField::ComponentId => self.component_id.get_or_insert_with(String::new),
            AuditField::Responsibility => &mut self.responsibility,
            AuditField::Date => &mut self.date,
            AuditField::Justification => &mut self.justification,
        }
    }

    pub fn build(self) -> crate::error::Result<AuditRecord> {
        let date = dor_types::parse_timestamp(self.date.trim())?;
        Ok(AuditRecord {
            id: self.id,
            process_type: self.process_type,
            action: self.action,
            component_id: self.component_id.filter(|c| !c.is_empty()),
            responsibility: self.responsibility,
            date,
            justification: self.justification,
        })
    }
}

/// A `fileGrp` holding the versions of one referenced datastream.
#[derive(Debug)]
pub struct FileGroupBuilder {
    pub id: String,
    pub state: Option<ComponentState>,
}

/// One version of a managed or external datastream.
#[derive(Debug)]
pub struct FileBuilder {
    pub version_id: String,
    pub control_group: ControlGroup,
    pub created: Option<Timestamp>,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    pub label: String,
    pub location: Option<String>,
    pub admids: Vec<String>,
    pub encoded: String,
    pub inline: bool,
    pub state: Option<ComponentState>,
}

/// The outer `div` of a `structMap`.
#[derive(Debug)]
pub struct BindingMapBuilder {
    pub struct_id: String,
    pub mechanism: String,
    pub label: String,
    pub bindings: Vec<DsBinding>,
}

/// A `behaviorSec`, completed by its `interfaceDef` and `mechanism` children.
#[derive(Debug, Default)]
pub struct BehaviorBuilder {
    pub disseminator_id: String,
    pub version_id: String,
    pub struct_id: String,
    pub label: String,
    pub created: Option<Timestamp>,
    pub state: Option<ComponentState>,
    pub bdef: Option<String>,
    pub bmech: Option<String>,
}

/// Entity under construction, one per open entity element.
#[derive(Debug)]
pub enum Partial {
    Section(SectionBuilder),
    MetadataVersion(MetadataVersionBuilder),
    Audit(AuditBuilder),
    FileGroup(FileGroupBuilder),
    File(FileBuilder),
    BindingMap(BindingMapBuilder),
    Binding(DsBinding),
    Behavior(BehaviorBuilder),
}
