use serde::{Deserialize, Serialize};

use crate::pid::Pid;
use crate::temporal::Timestamp;

/// Domain entry meaning "any value is allowed".
pub const UNRESTRICTED: &str = "*";

/// Where a method parameter's value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParmKind {
    /// Supplied by the caller of the dissemination.
    User,
    /// Bound to a datastream through the object's binding map.
    Datastream,
    /// Fixed by the mechanism.
    Default,
}

/// How a parameter value is passed to the mechanism's service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassBy {
    #[default]
    Value,
    UrlRef,
}

/// Definition of a single method parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodParmDef {
    pub name: String,
    pub label: String,
    pub default_value: Option<String>,
    pub required: bool,
    /// Allowed values. Empty, or containing [`UNRESTRICTED`], means any value.
    pub domain: Vec<String>,
    pub kind: ParmKind,
    pub pass_by: PassBy,
}

impl MethodParmDef {
    /// A user parameter with no domain restriction.
    pub fn user(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            label: String::new(),
            default_value: None,
            required,
            domain: Vec::new(),
            kind: ParmKind::User,
            pass_by: PassBy::Value,
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_domain<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domain = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_unrestricted(&self) -> bool {
        self.domain.is_empty() || self.domain.iter().any(|v| v == UNRESTRICTED)
    }

    /// Whether `value` is within this parameter's domain.
    pub fn allows(&self, value: &str) -> bool {
        self.is_unrestricted() || self.domain.iter().any(|v| v == value)
    }
}

/// An abstract method exposed by a behavior definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    pub label: String,
    pub parms: Vec<MethodParmDef>,
}

impl MethodDef {
    pub fn parm(&self, name: &str) -> Option<&MethodParmDef> {
        self.parms.iter().find(|p| p.name == name)
    }

    /// Parameters a caller may supply.
    pub fn user_parms(&self) -> impl Iterator<Item = &MethodParmDef> {
        self.parms.iter().filter(|p| p.kind == ParmKind::User)
    }
}

/// Methods declared by a behavior definition object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorSpec {
    pub bdef_pid: Option<Pid>,
    pub methods: Vec<MethodDef>,
}

/// Service protocol a mechanism is reached over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Http,
    Other(String),
}

impl Protocol {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("http") {
            Self::Http
        } else {
            Self::Other(s.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Http => "HTTP",
            Self::Other(s) => s,
        }
    }
}

/// A mechanism's concrete implementation of one method.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanismMethod {
    pub def: MethodDef,
    /// Operation template relative to the service address, with `(KEY)`
    /// placeholders for binding keys and parameters.
    pub operation_location: String,
    pub return_mime_types: Vec<String>,
}

impl MechanismMethod {
    /// Binding keys (datastream parameters) this method consumes.
    pub fn binding_keys(&self) -> impl Iterator<Item = &str> {
        self.def
            .parms
            .iter()
            .filter(|p| p.kind == ParmKind::Datastream)
            .map(|p| p.name.as_str())
    }
}

/// Methods implemented by a behavior mechanism object and how to reach them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanismSpec {
    pub bdef_pid: Option<Pid>,
    pub address: String,
    pub protocol: Protocol,
    pub methods: Vec<MechanismMethod>,
}

impl MechanismSpec {
    pub fn method(&self, name: &str) -> Option<&MechanismMethod> {
        self.methods.iter().find(|m| m.def.name == name)
    }
}

/// One method an object exposes through one of its disseminators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMethodsDef {
    pub pid: Pid,
    pub bdef_pid: Pid,
    pub method_name: String,
    pub parms: Vec<MethodParmDef>,
    pub as_of: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_domain_is_unrestricted() {
        let p = MethodParmDef::user("q", false);
        assert!(p.is_unrestricted());
        assert!(p.allows("anything"));
    }

    #[test]
    fn sentinel_domain_is_unrestricted() {
        let p = MethodParmDef::user("q", false).with_domain(["a", UNRESTRICTED]);
        assert!(p.allows("zzz"));
    }

    #[test]
    fn finite_domain_restricts() {
        let p = MethodParmDef::user("size", false).with_domain(["thumb", "full"]);
        assert!(p.allows("thumb"));
        assert!(!p.allows("huge"));
    }

    #[test]
    fn protocol_parse() {
        assert_eq!(Protocol::parse("http"), Protocol::Http);
        assert_eq!(Protocol::parse("SOAP"), Protocol::Other("SOAP".into()));
    }

    #[test]
    fn binding_keys_are_datastream_parms() {
        let mut ds = MethodParmDef::user("IMAGE", true);
        ds.kind = ParmKind::Datastream;
        let m = MechanismMethod {
            def: MethodDef {
                name: "getThumbnail".into(),
                label: String::new(),
                parms: vec![MethodParmDef::user("size", false), ds],
            },
            operation_location: "thumb?img=(IMAGE)".into(),
            return_mime_types: vec!["image/jpeg".into()],
        };
        assert_eq!(m.binding_keys().collect::<Vec<_>>(), vec!["IMAGE"]);
    }
}
