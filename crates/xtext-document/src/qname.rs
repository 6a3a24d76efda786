//! Qualified names.
//!
//! Names are matched by prefix equality: `tei:p` and `p` are distinct keys,
//! and no namespace URI resolution takes place. This keeps the configuration
//! document, query descriptions, and index field keys in one string space.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A qualified element or attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    /// Optional namespace prefix.
    pub prefix: Option<String>,
    /// Local part of the name.
    pub local: String,
}

impl QName {
    /// Creates a name with no prefix.
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local: name.into(),
        }
    }

    /// Creates a prefixed name.
    pub fn prefixed(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            local: name.into(),
        }
    }

    /// Parses a `prefix:local` or bare `local` name.
    pub fn parse(name: &str) -> Self {
        match name.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => {
                Self::prefixed(prefix, local)
            }
            _ => Self::local(name),
        }
    }

    /// Returns the name as a single string key, `prefix:local` or `local`.
    ///
    /// This is the encoding used for index field names and rule table keys.
    pub fn encoded(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local),
            None => self.local.clone(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{prefix}:{}", self.local),
            None => write!(f, "{}", self.local),
        }
    }
}
