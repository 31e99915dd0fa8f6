use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum length of a pid, namespace and separator included.
pub const MAX_PID_LENGTH: usize = 64;

/// URI scheme prefix used when a pid appears as an RDF subject or object.
pub const PID_URI_PREFIX: &str = "info:fedora/";

/// Persistent identifier of a digital object.
///
/// A pid has the shape `namespace:id`. The namespace is one or more
/// characters from `[A-Za-z0-9.-]`; the id is one or more characters from
/// `[A-Za-z0-9.~_-]` or a `%XX` escape. A pid never changes once assigned.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pid(String);

impl Pid {
    /// Parse and validate a pid.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidPid {
            pid: s.to_string(),
            reason: reason.to_string(),
        };

        if s.len() > MAX_PID_LENGTH {
            return Err(invalid("longer than 64 characters"));
        }
        let (namespace, id) = s.split_once(':').ok_or_else(|| invalid("missing ':'"))?;
        if namespace.is_empty() {
            return Err(invalid("empty namespace"));
        }
        if !namespace
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
        {
            return Err(invalid("namespace contains an illegal character"));
        }
        if id.is_empty() {
            return Err(invalid("empty object id"));
        }

        let bytes = id.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if b == b'%' {
                let escape = bytes.get(i + 1..i + 3);
                match escape {
                    Some(hex) if hex.iter().all(u8::is_ascii_hexdigit) => i += 3,
                    _ => return Err(invalid("malformed %XX escape")),
                }
                continue;
            }
            if !(b.is_ascii_alphanumeric() || matches!(b, b'.' | b'~' | b'_' | b'-')) {
                return Err(invalid("object id contains an illegal character"));
            }
            i += 1;
        }

        Ok(Self(s.to_string()))
    }

    /// Build a pid from a namespace and an object id.
    pub fn from_parts(namespace: &str, id: &str) -> Result<Self, TypeError> {
        Self::parse(&format!("{namespace}:{id}"))
    }

    /// Parse the `info:fedora/<pid>` URI form.
    pub fn from_uri(uri: &str) -> Result<Self, TypeError> {
        let raw = uri
            .strip_prefix(PID_URI_PREFIX)
            .ok_or_else(|| TypeError::InvalidPid {
                pid: uri.to_string(),
                reason: format!("URI does not start with {PID_URI_PREFIX}"),
            })?;
        Self::parse(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace prefix (before the `:`).
    pub fn namespace(&self) -> &str {
        self.0.split_once(':').map(|(ns, _)| ns).unwrap_or_default()
    }

    /// The object id (after the `:`).
    pub fn object_id(&self) -> &str {
        self.0.split_once(':').map(|(_, id)| id).unwrap_or_default()
    }

    /// The `info:fedora/<pid>` URI form.
    pub fn to_uri(&self) -> String {
        format!("{PID_URI_PREFIX}{}", self.0)
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Pid {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Pid {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Pid> for String {
    fn from(pid: Pid) -> Self {
        pid.0
    }
}

impl AsRef<str> for Pid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
