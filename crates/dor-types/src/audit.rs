use serde::{Deserialize, Serialize};

use crate::temporal::Timestamp;

/// One entry of an object's audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    /// Kind of process that made the change (e.g. "Fedora API-M").
    pub process_type: String,
    pub action: String,
    /// Datastream or disseminator id the action touched, if any.
    pub component_id: Option<String>,
    pub responsibility: String,
    pub date: Timestamp,
    pub justification: String,
}
