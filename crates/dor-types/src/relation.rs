use std::fmt;

use serde::{Deserialize, Serialize};

/// Object of a relationship statement.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TripleObject {
    Resource(String),
    Literal(String),
}

impl TripleObject {
    pub fn value(&self) -> &str {
        match self {
            Self::Resource(v) | Self::Literal(v) => v,
        }
    }
}

/// A subject/predicate/object statement about an object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: TripleObject,
}

impl Triple {
    pub fn resource(subject: impl Into<String>, predicate: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: TripleObject::Resource(object.into()),
        }
    }

    pub fn literal(subject: impl Into<String>, predicate: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: TripleObject::Literal(object.into()),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.object {
            TripleObject::Resource(o) => write!(f, "<{}> <{}> <{}>", self.subject, self.predicate, o),
            TripleObject::Literal(o) => write!(f, "<{}> <{}> \"{}\"", self.subject, self.predicate, o),
        }
    }
}
