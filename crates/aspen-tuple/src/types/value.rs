//! Scalar type descriptors and typed values.

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use chrono::DateTime;
use chrono::Utc;

// =============================================================================
// Type Descriptor
// =============================================================================

/// Identifies the scalar type of a field or value.
///
/// Every type except [`ValueType::Float`] is *sortable* and may appear in a
/// key. Floats are *opaque*: they have no total order and are payload-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    /// UTF-8 string.
    String,
    /// Raw byte string.
    Bytes,
    /// Signed 64-bit integer.
    Int,
    /// Unsigned 64-bit integer.
    UInt,
    /// Boolean.
    Bool,
    /// Instant in time with nanosecond precision.
    Time,
    /// 64-bit floating point (payload only).
    Float,
}

impl ValueType {
    /// All supported types, in tag order.
    pub const ALL: [ValueType; 7] = [
        ValueType::String,
        ValueType::Bytes,
        ValueType::Int,
        ValueType::UInt,
        ValueType::Bool,
        ValueType::Time,
        ValueType::Float,
    ];

    /// Whether values of this type can be used in a key.
    pub fn is_sortable(self) -> bool {
        !matches!(self, ValueType::Float)
    }

    /// Stable one-byte tag used by the payload codec and the catalog.
    pub fn tag(self) -> u8 {
        match self {
            ValueType::String => 0x01,
            ValueType::Bytes => 0x02,
            ValueType::Int => 0x03,
            ValueType::UInt => 0x04,
            ValueType::Bool => 0x05,
            ValueType::Time => 0x06,
            ValueType::Float => 0x07,
        }
    }

    /// Inverse of [`ValueType::tag`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Encoded width for fixed-size types, `None` for variable-length ones.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ValueType::String | ValueType::Bytes => None,
            ValueType::Int | ValueType::UInt | ValueType::Time | ValueType::Float => Some(8),
            ValueType::Bool => Some(1),
        }
    }

    /// Lowercase type name.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Bytes => "bytes",
            ValueType::Int => "int",
            ValueType::UInt => "uint",
            ValueType::Bool => "bool",
            ValueType::Time => "time",
            ValueType::Float => "float",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Timestamp
// =============================================================================

/// Signed count of nanoseconds since the Unix epoch.
///
/// Covers roughly the years 1677 through 2262. Instants before the epoch are
/// negative and sort before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Build from nanoseconds since the epoch.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Build from whole seconds plus a nanosecond offset, like `time.Unix`.
    ///
    /// Returns `None` if the instant does not fit in 64 bits of nanoseconds.
    pub fn from_unix(secs: i64, nanos: i64) -> Option<Self> {
        secs.checked_mul(1_000_000_000).and_then(|n| n.checked_add(nanos)).map(Self)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now()).unwrap_or_default()
    }

    /// Nanoseconds since the epoch.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Convert from a `SystemTime`, `None` when out of range.
    pub fn from_system_time(t: SystemTime) -> Option<Self> {
        match t.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_nanos()).ok().map(Self),
            Err(before) => {
                let nanos = i64::try_from(before.duration().as_nanos()).ok()?;
                Some(Self(-nanos))
            }
        }
    }

    /// Convert to a `SystemTime`.
    pub fn to_system_time(self) -> SystemTime {
        let magnitude = Duration::from_nanos(self.0.unsigned_abs());
        if self.0 >= 0 {
            UNIX_EPOCH + magnitude
        } else {
            UNIX_EPOCH - magnitude
        }
    }

    /// Convert from a chrono UTC datetime, `None` when out of range.
    pub fn from_datetime(dt: &DateTime<Utc>) -> Option<Self> {
        dt.timestamp_nanos_opt().map(Self)
    }

    /// Convert to a chrono UTC datetime.
    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

// =============================================================================
// Value
// =============================================================================

/// A typed scalar instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string.
    String(String),
    /// Raw byte string.
    Bytes(Vec<u8>),
    /// Signed 64-bit integer.
    Int(i64),
    /// Unsigned 64-bit integer.
    UInt(u64),
    /// Boolean.
    Bool(bool),
    /// Instant in time.
    Time(Timestamp),
    /// 64-bit float (payload only).
    Float(f64),
}

impl Value {
    /// Type descriptor of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Int(_) => ValueType::Int,
            Value::UInt(_) => ValueType::UInt,
            Value::Bool(_) => ValueType::Bool,
            Value::Time(_) => ValueType::Time,
            Value::Float(_) => ValueType::Float,
        }
    }

    /// Whether this value may be used in a key.
    pub fn is_sortable(&self) -> bool {
        self.value_type().is_sortable()
    }

    /// Natural order between two sortable values of the same type.
    ///
    /// Returns `None` when the types differ or either value is opaque.
    pub fn cmp_sortable(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::UInt(a), Value::UInt(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Borrow the string content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is a signed integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Int(n) => write!(f, "{n}"),
            Value::UInt(n) => write!(f, "{n}u"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::UInt(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::UInt(u64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Timestamp> for Value {
    fn from(t: Timestamp) -> Self {
        Value::Time(t)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}
