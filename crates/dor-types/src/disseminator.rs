use serde::{Deserialize, Serialize};

use crate::datastream::ComponentState;
use crate::pid::Pid;
use crate::temporal::Timestamp;

/// Assignment of one datastream to a role a mechanism expects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsBinding {
    pub binding_key: String,
    pub datastream_id: String,
    pub label: String,
    pub seq: u32,
}

/// Ordered bindings of an object's datastreams to a mechanism's roles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsBindingMap {
    /// Structural-map id shared with the disseminator that uses this map.
    pub id: String,
    pub mechanism_pid: Pid,
    pub label: String,
    pub bindings: Vec<DsBinding>,
}

impl DsBindingMap {
    /// Bindings for `key` in sequence order.
    pub fn bindings_for(&self, key: &str) -> Vec<&DsBinding> {
        let mut found: Vec<&DsBinding> = self
            .bindings
            .iter()
            .filter(|b| b.binding_key == key)
            .collect();
        found.sort_by_key(|b| b.seq);
        found
    }
}

/// One version of a disseminator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disseminator {
    pub id: String,
    pub version_id: String,
    pub bdef_pid: Pid,
    pub bmech_pid: Pid,
    pub binding_map_id: String,
    pub label: String,
    pub state: Option<ComponentState>,
    pub created: Option<Timestamp>,
    pub binding_map: DsBindingMap,
}

impl Disseminator {
    pub fn effective_state(&self) -> ComponentState {
        self.state.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(key: &str, ds: &str, seq: u32) -> DsBinding {
        DsBinding {
            binding_key: key.into(),
            datastream_id: ds.into(),
            label: format!("{key} binding"),
            seq,
        }
    }

    #[test]
    fn bindings_for_key_are_ordered() {
        let map = DsBindingMap {
            id: "S1".into(),
            mechanism_pid: Pid::parse("bmech:1").unwrap(),
            label: "map".into(),
            bindings: vec![
                binding("PAGE", "P2", 1),
                binding("THUMB", "T", 0),
                binding("PAGE", "P1", 0),
            ],
        };
        let pages = map.bindings_for("PAGE");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].datastream_id, "P1");
        assert_eq!(pages[1].datastream_id, "P2");
        assert!(map.bindings_for("MISSING").is_empty());
    }
}
