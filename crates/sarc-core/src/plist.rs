//! # Property-List Value Tree
//!
//! [`Plist`] is the in-memory form of a decoded `bplist00` document. It is a
//! plain tree: the binary format allows objects to be shared by reference,
//! but sharing at this level carries no meaning for keyed archives, so the
//! reader materializes shared objects as independent copies (bounded by the
//! node budget in [`ParseLimits`](crate::ParseLimits)).
//!
//! Dictionary keys are always strings. Keyed archives never use anything
//! else, and the reader rejects non-string keys as malformed.

use indexmap::IndexMap;

use crate::uid::Uid;

/// A property-list value.
#[derive(Debug, Clone, PartialEq)]
pub enum Plist {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    /// Seconds since 2001-01-01T00:00:00Z.
    Date(f64),
    Data(Vec<u8>),
    String(String),
    Uid(Uid),
    Array(Vec<Plist>),
    Dictionary(IndexMap<String, Plist>),
}

impl Plist {
    /// Short name of the value kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Date(_) => "date",
            Self::Data(_) => "data",
            Self::String(_) => "string",
            Self::Uid(_) => "uid",
            Self::Array(_) => "array",
            Self::Dictionary(_) => "dictionary",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_uid(&self) -> Option<Uid> {
        match self {
            Self::Uid(uid) => Some(*uid),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&IndexMap<String, Plist>> {
        match self {
            Self::Dictionary(map) => Some(map),
            _ => None,
        }
    }
}

impl From<&str> for Plist {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Plist {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Plist {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<Uid> for Plist {
    fn from(uid: Uid) -> Self {
        Self::Uid(uid)
    }
}
