//! Identifier types used throughout the cache.
//!
//! Records are keyed by their *effective id*: the server-assigned id when one
//! exists, otherwise the temporary id generated on the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The key a record is stored under.
///
/// Servers hand out either integer or string ids, so both are representable.
/// `Num(7)` and `Str("7")` are distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Num(i64),
    Str(String),
}

impl Id {
    /// Reads an id out of a JSON value.
    ///
    /// Returns `None` for `null`, empty strings, and anything that is not an
    /// integer or a string.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Id::Num),
            Value::String(s) if !s.is_empty() => Some(Id::Str(s.clone())),
            _ => None,
        }
    }

    /// Like [`Id::from_value`], but reports the rejected value.
    pub fn try_from_value(value: &Value) -> crate::Result<Self> {
        Self::from_value(value).ok_or_else(|| crate::Error::InvalidId(value.clone()))
    }

    /// Converts the id back into the JSON value it was read from.
    pub fn to_value(&self) -> Value {
        match self {
            Id::Num(n) => Value::from(*n),
            Id::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Num(n) => write!(f, "{n}"),
            Id::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Num(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Str(s.to_string())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::Str(s)
    }
}

impl From<TempId> for Id {
    fn from(temp: TempId) -> Self {
        Id::Str(temp.to_string())
    }
}

/// Client-generated identifier for a record the server has not confirmed yet.
/// Uses UUID v7 so temp ids sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(Uuid);

impl TempId {
    /// Creates a new temp id with the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TempId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for TempId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
