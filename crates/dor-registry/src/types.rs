//! The registry row type.

use dor_types::{DigitalObject, ObjectKind, Pid};
use serde::{Deserialize, Serialize};

/// One catalog row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub pid: Pid,
    pub kind: ObjectKind,
    pub owner: String,
    pub label: String,
    pub content_model: Option<String>,
    /// Bumped once per successful modify commit.
    pub system_version: u64,
}

impl RegistryEntry {
    /// A fresh row for `object` at system version 0.
    pub fn for_object(object: &DigitalObject, owner: impl Into<String>) -> Self {
        Self {
            pid: object.pid.clone(),
            kind: object.kind,
            owner: owner.into(),
            label: object.label.clone(),
            content_model: object.content_model.clone(),
            system_version: 0,
        }
    }

    /// The persisted kind code (`O`, `D`, or `M`).
    pub fn kind_code(&self) -> char {
        self.kind.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_from_object() {
        let mut obj = DigitalObject::new(Pid::parse("demo:1").unwrap(), ObjectKind::BehaviorMechanism);
        obj.label = "mech".into();
        obj.content_model = Some("cm".into());
        let row = RegistryEntry::for_object(&obj, "fedoraAdmin");
        assert_eq!(row.kind_code(), 'M');
        assert_eq!(row.label, "mech");
        assert_eq!(row.system_version, 0);
        assert_eq!(row.owner, "fedoraAdmin");
    }

    #[test]
    fn entry_serializes() {
        let obj = DigitalObject::new(Pid::parse("demo:2").unwrap(), ObjectKind::DataObject);
        let row = RegistryEntry::for_object(&obj, "alice");
        let json = serde_json::to_string(&row).unwrap();
        let back: RegistryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}
