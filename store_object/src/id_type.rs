//! Primary-key values
//!
//! Entities of any kind expose their primary key as a `KeyValue`, so cache keys,
//! identity maps and error messages can handle numeric, UUID and string keys alike.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Write};
use uuid::Uuid;

/// Primary-key value that can hold numeric IDs, UUIDs or string IDs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    /// Numeric ID (i32, i64, etc.)
    Numeric(i64),
    /// UUID ID
    Uuid(Uuid),
    /// String-based ID
    String(String),
}

impl KeyValue {
    /// Blank strings and the nil UUID identify nothing
    pub fn is_empty(&self) -> bool {
        match self {
            KeyValue::Numeric(_) => false,
            KeyValue::Uuid(uuid) => uuid.is_nil(),
            KeyValue::String(s) => s.trim().is_empty(),
        }
    }

    /// Type-tagged token, so the number `5` and the string `"5"` never share a cache key
    pub fn key_token(&self) -> String {
        let mut token = String::with_capacity(40);
        let _ = match self {
            KeyValue::Numeric(n) => write!(token, "n:{}", n),
            KeyValue::Uuid(uuid) => write!(token, "u:{}", uuid),
            KeyValue::String(s) => write!(token, "s:{}", s),
        };
        token
    }

    /// JSON form of the key, for binding and for comparing against serialized rows
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            KeyValue::Numeric(n) => serde_json::Value::from(*n),
            KeyValue::Uuid(uuid) => serde_json::Value::String(uuid.to_string()),
            KeyValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Numeric(n) => write!(f, "{}", n),
            KeyValue::Uuid(uuid) => write!(f, "{}", uuid),
            KeyValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for KeyValue {
    fn from(id: i32) -> Self {
        KeyValue::Numeric(id as i64)
    }
}

impl From<i64> for KeyValue {
    fn from(id: i64) -> Self {
        KeyValue::Numeric(id)
    }
}

impl From<u32> for KeyValue {
    fn from(id: u32) -> Self {
        KeyValue::Numeric(id as i64)
    }
}

impl From<Uuid> for KeyValue {
    fn from(id: Uuid) -> Self {
        KeyValue::Uuid(id)
    }
}

impl From<String> for KeyValue {
    fn from(id: String) -> Self {
        KeyValue::String(id)
    }
}

impl From<&str> for KeyValue {
    fn from(id: &str) -> Self {
        KeyValue::String(id.to_string())
    }
}
