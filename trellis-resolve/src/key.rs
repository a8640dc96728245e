//! Hashable parent-identifier keys for batch windows.

use serde_json::Value;
use smol_str::SmolStr;
use std::fmt;

/// A parent identifier value collected into a batch window.
///
/// Batch slots are keyed on these, so only hashable identifier types are
/// representable; floats and structured values are not valid parent keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentKey {
    /// Boolean identifier.
    Bool(bool),
    /// Integer identifier.
    Int(i64),
    /// String identifier (uuid, cuid, natural key).
    String(SmolStr),
}

impl ParentKey {
    /// Convert a JSON value into a key, if it is a supported identifier
    /// type.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::String(SmolStr::from(s))),
            _ => None,
        }
    }

    /// Render the key back into its JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::String(s) => Value::String(s.to_string()),
        }
    }
}

impl From<i64> for ParentKey {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ParentKey {
    fn from(v: &str) -> Self {
        Self::String(SmolStr::from(v))
    }
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
        }
    }
}
