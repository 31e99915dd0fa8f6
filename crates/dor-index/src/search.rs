//! Field search over committed objects.
//!
//! Each object is reduced to a flat set of named fields: system fields
//! (`pid`, `label`, `state`, `fType`, `cModel`, `cDate`, `mDate`) and the
//! fifteen Dublin Core elements read from its `DC` datastream. Queries are
//! either a conjunction of field conditions (`pid~demo:* cDate>2004`) or a
//! terms pattern matched against every field. Large result sets are paged
//! through session tokens.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use dor_codec::DcRecord;
use dor_types::object::DC_DATASTREAM_ID;
use dor_types::{format_timestamp, DigitalObject, Pid};

use crate::error::{poisoned, IndexError, IndexResult};

/// Fields every object carries, in result order.
pub const SYSTEM_FIELDS: &[&str] = &["pid", "label", "state", "fType", "cModel", "cDate", "mDate"];

/// Dublin Core elements copied from the `DC` datastream.
pub const DC_FIELDS: &[&str] = &[
    "title",
    "creator",
    "subject",
    "description",
    "publisher",
    "contributor",
    "date",
    "type",
    "format",
    "identifier",
    "source",
    "language",
    "relation",
    "coverage",
    "rights",
];

fn is_known_field(name: &str) -> bool {
    SYSTEM_FIELDS.contains(&name) || DC_FIELDS.contains(&name)
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// The searchable fields of one object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectFields {
    pub pid: Pid,
    pub values: BTreeMap<String, Vec<String>>,
}

impl ObjectFields {
    pub fn of(object: &DigitalObject) -> IndexResult<Self> {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut put = |name: &str, value: String| {
            values.entry(name.to_string()).or_default().push(value);
        };
        put("pid", object.pid.to_string());
        put("label", object.label.clone());
        put("state", object.effective_state().code().to_string());
        put("fType", object.kind.code().to_string());
        if let Some(model) = &object.content_model {
            put("cModel", model.clone());
        }
        if let Some(created) = &object.created {
            put("cDate", format_timestamp(created));
        }
        if let Some(modified) = &object.last_modified {
            put("mDate", format_timestamp(modified));
        }

        if let Some(dc) = object
            .datastream_as_of(DC_DATASTREAM_ID, None)
            .and_then(|ds| ds.xml_content())
        {
            let record = DcRecord::parse(dc)?;
            for (element, found) in record.elements {
                if DC_FIELDS.contains(&element.as_str()) {
                    values.entry(element).or_default().extend(found);
                }
            }
        }

        Ok(Self {
            pid: object.pid.clone(),
            values,
        })
    }

    pub fn values(&self, field: &str) -> &[String] {
        self.values.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// A copy restricted to `fields`; `pid` is always kept.
    pub fn project(&self, fields: &[String]) -> Self {
        let values = self
            .values
            .iter()
            .filter(|(name, _)| name.as_str() == "pid" || fields.iter().any(|f| f == *name))
            .map(|(name, v)| (name.clone(), v.clone()))
            .collect();
        Self {
            pid: self.pid.clone(),
            values,
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// `=`: some value equals the operand exactly.
    Eq,
    /// `~`: some value matches the operand as a case-insensitive glob.
    Has,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Operator {
    fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Has => "~",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: String,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    fn matches(&self, fields: &ObjectFields) -> bool {
        fields.values(&self.field).iter().any(|v| match self.operator {
            Operator::Eq => v == &self.value,
            Operator::Has => glob_match(&self.value, v),
            Operator::Gt => v.as_str() > self.value.as_str(),
            Operator::Ge => v.as_str() >= self.value.as_str(),
            Operator::Lt => v.as_str() < self.value.as_str(),
            Operator::Le => v.as_str() <= self.value.as_str(),
        })
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.field, self.operator.symbol(), self.value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldQuery {
    /// Every condition must hold. An empty list matches everything.
    Conditions(Vec<Condition>),
    /// A glob matched against any value of any field.
    Terms(String),
}

impl FieldQuery {
    pub fn matches(&self, fields: &ObjectFields) -> bool {
        match self {
            Self::Conditions(conditions) => conditions.iter().all(|c| c.matches(fields)),
            Self::Terms(pattern) => fields
                .values
                .values()
                .flatten()
                .any(|v| glob_match(pattern, v)),
        }
    }

    fn check_fields(&self) -> IndexResult<()> {
        if let Self::Conditions(conditions) = self {
            if let Some(c) = conditions.iter().find(|c| !is_known_field(&c.field)) {
                return Err(IndexError::UnknownField(c.field.clone()));
            }
        }
        Ok(())
    }
}

/// Case-insensitive glob match where `*` is any run and `?` any one char.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
    let t: Vec<char> = text.to_lowercase().chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

// ---------------------------------------------------------------------------
// Results and the index contract
// ---------------------------------------------------------------------------

/// One page of search results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindObjectsResult {
    pub objects: Vec<ObjectFields>,
    /// Present while more results remain.
    pub token: Option<String>,
    /// Index of the first object of this page within the full list.
    pub cursor: usize,
    pub complete_list_size: usize,
}

/// Field search index.
pub trait SearchIndex: Send + Sync {
    /// Insert or refresh the fields of `object`.
    fn update(&self, object: &DigitalObject) -> IndexResult<()>;

    fn delete(&self, pid: &Pid) -> IndexResult<()>;

    /// First page of objects matching `query`, in pid order.
    fn find_objects(
        &self,
        result_fields: &[String],
        max_results: usize,
        query: &FieldQuery,
    ) -> IndexResult<FindObjectsResult>;

    /// Next page of an earlier search.
    fn resume_find_objects(&self, token: &str) -> IndexResult<FindObjectsResult>;
}

struct Session {
    remaining: VecDeque<ObjectFields>,
    page_size: usize,
    cursor: usize,
    total: usize,
}

/// An in-memory implementation of [`SearchIndex`].
#[derive(Default)]
pub struct InMemorySearchIndex {
    rows: RwLock<BTreeMap<Pid, ObjectFields>>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, pid: &Pid) -> bool {
        self.rows.read().map(|r| r.contains_key(pid)).unwrap_or(false)
    }

    fn page(&self, token: String, mut session: Session) -> IndexResult<FindObjectsResult> {
        let take = session.page_size.min(session.remaining.len());
        let objects: Vec<ObjectFields> = session.remaining.drain(..take).collect();
        let cursor = session.cursor;
        session.cursor += objects.len();
        let total = session.total;

        let token = if session.remaining.is_empty() {
            None
        } else {
            let mut sessions = self.sessions.lock().map_err(poisoned)?;
            sessions.insert(token.clone(), session);
            Some(token)
        };
        Ok(FindObjectsResult {
            objects,
            token,
            cursor,
            complete_list_size: total,
        })
    }
}

impl std::fmt::Debug for InMemorySearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySearchIndex").finish_non_exhaustive()
    }
}

impl SearchIndex for InMemorySearchIndex {
    fn update(&self, object: &DigitalObject) -> IndexResult<()> {
        let fields = ObjectFields::of(object)?;
        let mut rows = self.rows.write().map_err(poisoned)?;
        rows.insert(object.pid.clone(), fields);
        debug!(pid = %object.pid, "updated search fields");
        Ok(())
    }

    fn delete(&self, pid: &Pid) -> IndexResult<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        rows.remove(pid).ok_or_else(|| IndexError::NotFound(pid.clone()))?;
        debug!(%pid, "deleted search fields");
        Ok(())
    }

    fn find_objects(
        &self,
        result_fields: &[String],
        max_results: usize,
        query: &FieldQuery,
    ) -> IndexResult<FindObjectsResult> {
        if let Some(f) = result_fields.iter().find(|f| !is_known_field(f)) {
            return Err(IndexError::UnknownField(f.clone()));
        }
        query.check_fields()?;

        let matched: VecDeque<ObjectFields> = {
            let rows = self.rows.read().map_err(poisoned)?;
            rows.values()
                .filter(|fields| query.matches(fields))
                .map(|fields| fields.project(result_fields))
                .collect()
        };
        debug!(matched = matched.len(), max_results, "find objects");
        let session = Session {
            total: matched.len(),
            remaining: matched,
            page_size: max_results.max(1),
            cursor: 0,
        };
        self.page(Uuid::now_v7().to_string(), session)
    }

    fn resume_find_objects(&self, token: &str) -> IndexResult<FindObjectsResult> {
        let session = {
            let mut sessions = self.sessions.lock().map_err(poisoned)?;
            sessions
                .remove(token)
                .ok_or_else(|| IndexError::UnknownSession(token.to_string()))?
        };
        self.page(token.to_string(), session)
    }
}
