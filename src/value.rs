//! Attribute values stored on a request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of a single attribute instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

impl AttrValue {
    /// Parse raw text the way a lookup result is usually typed: integers and
    /// booleans are recognised, anything else stays a string.
    pub fn infer(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return AttrValue::Integer(i);
        }
        match raw {
            "true" => AttrValue::Bool(true),
            "false" => AttrValue::Bool(false),
            _ => AttrValue::String(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::String(s) => write!(f, "{}", s),
            AttrValue::Integer(i) => write!(f, "{}", i),
            AttrValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Integer(i)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<serde_json::Value> for AttrValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => AttrValue::String(s),
            serde_json::Value::Bool(b) => AttrValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AttrValue::Integer(i),
                None => AttrValue::String(n.to_string()),
            },
            serde_json::Value::Null => AttrValue::String(String::new()),
            // Arrays and objects are flattened to their JSON text
            other => AttrValue::String(other.to_string()),
        }
    }
}
