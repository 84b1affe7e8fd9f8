//! Keys, payloads and tuples.

use super::value::Value;

/// Key values in header-declared order.
pub type Key = Vec<Value>;

/// Payload values in header-declared order.
pub type Data = Vec<Value>;

/// Partial key for scans: leading explicit values, then optional wildcards.
pub type KeyPrefix = Vec<Option<Value>>;

/// One row of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    /// Key values.
    pub key: Key,
    /// Payload values.
    pub data: Data,
}

impl Tuple {
    /// Create a tuple.
    pub fn new(key: Key, data: Data) -> Self {
        Self { key, data }
    }
}

/// Build a key of string values.
pub fn skey(parts: &[&str]) -> Key {
    parts.iter().map(|s| Value::from(*s)).collect()
}

/// Build a payload of string values.
pub fn sdata(parts: &[&str]) -> Data {
    parts.iter().map(|s| Value::from(*s)).collect()
}

/// Turn a full or partial key into a scan prefix with no wildcards.
pub fn prefix_of(key: &[Value]) -> KeyPrefix {
    key.iter().cloned().map(Some).collect()
}
