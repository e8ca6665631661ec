use std::fmt;

use serde::{Deserialize, Serialize};

pub const DAV_NAMESPACE: &str = "DAV:";

/// Qualified property name: namespace URI plus local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyName {
    pub namespace: String,
    pub name: String,
}

impl PropertyName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn dav(name: impl Into<String>) -> Self {
        Self::new(DAV_NAMESPACE, name)
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Clark notation, e.g. "{DAV:}getcontentlength".
        write!(f, "{{{}}}{}", self.namespace, self.name)
    }
}

/// One metadata value of an entry.
///
/// Live properties are produced by the entry on demand and may report
/// themselves invalid; dead properties come from a property store and
/// are always valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: PropertyName,
    pub value: String,
    pub writable: bool,
    pub valid: bool,
}

impl Property {
    pub fn new(name: PropertyName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
            writable: true,
            valid: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }
}
