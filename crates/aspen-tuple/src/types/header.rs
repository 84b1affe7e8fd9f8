//! Table headers: the named, typed shape of a table's keys and payloads.

use std::collections::HashSet;

use super::value::Value;
use super::value::ValueType;
use crate::constants::MAX_DATA_FIELDS;
use crate::constants::MAX_KEY_FIELDS;
use crate::constants::MAX_NAME_LENGTH_BYTES;
use crate::error::StoreError;
use crate::error::StoreResult;

/// A named payload column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    /// Column name, unique among the header's data fields.
    pub name: String,
    /// Column type.
    pub value_type: ValueType,
}

impl Field {
    /// Create a data field.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// A named key column. Its type must be sortable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyField {
    /// Column name, unique among the header's key fields.
    pub name: String,
    /// Column type.
    pub value_type: ValueType,
}

impl KeyField {
    /// Create a key field.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// Schema of one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    /// Table name.
    pub name: String,
    /// Key fields in key order. Never empty.
    pub key: Vec<KeyField>,
    /// Payload fields in storage order.
    pub data: Vec<Field>,
}

impl Header {
    /// Create a header.
    pub fn new(name: impl Into<String>, key: Vec<KeyField>, data: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            key,
            data,
        }
    }

    /// Check the header's structural invariants.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SchemaMismatch` when the name is empty or too
    /// long, the key is empty, a key field is not sortable, names repeat, or
    /// a field limit is exceeded.
    pub fn validate(&self) -> StoreResult<()> {
        validate_name("table", &self.name)?;

        if self.key.is_empty() {
            return Err(StoreError::schema(format!("table '{}' has no key fields", self.name)));
        }
        if self.key.len() > MAX_KEY_FIELDS as usize {
            return Err(StoreError::schema(format!(
                "table '{}' has {} key fields, max is {}",
                self.name,
                self.key.len(),
                MAX_KEY_FIELDS
            )));
        }
        if self.data.len() > MAX_DATA_FIELDS as usize {
            return Err(StoreError::schema(format!(
                "table '{}' has {} data fields, max is {}",
                self.name,
                self.data.len(),
                MAX_DATA_FIELDS
            )));
        }

        let mut seen = HashSet::with_capacity(self.key.len());
        for field in &self.key {
            validate_name("key field", &field.name)?;
            if !field.value_type.is_sortable() {
                return Err(StoreError::schema(format!(
                    "key field '{}' has type {} which is not sortable",
                    field.name, field.value_type
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(StoreError::schema(format!("duplicate key field '{}'", field.name)));
            }
        }

        let mut seen = HashSet::with_capacity(self.data.len());
        for field in &self.data {
            validate_name("data field", &field.name)?;
            if !seen.insert(field.name.as_str()) {
                return Err(StoreError::schema(format!("duplicate data field '{}'", field.name)));
            }
        }

        Ok(())
    }

    /// Key field types in key order.
    pub fn key_types(&self) -> impl Iterator<Item = ValueType> + '_ {
        self.key.iter().map(|f| f.value_type)
    }

    /// Data field types in storage order.
    pub fn data_types(&self) -> impl Iterator<Item = ValueType> + '_ {
        self.data.iter().map(|f| f.value_type)
    }
}

// =============================================================================
// Shape Checks
// =============================================================================

impl Header {
    /// Check that a full key matches the key fields in count and type.
    pub fn check_key(&self, key: &[Value]) -> StoreResult<()> {
        if key.len() != self.key.len() {
            return Err(StoreError::schema(format!(
                "table '{}' expects {} key fields, got {}",
                self.name,
                self.key.len(),
                key.len()
            )));
        }
        for (field, value) in self.key.iter().zip(key) {
            check_type(&field.name, field.value_type, value)?;
        }
        Ok(())
    }

    /// Check that a payload matches the data fields in count and type.
    pub fn check_data(&self, data: &[Value]) -> StoreResult<()> {
        if data.len() != self.data.len() {
            return Err(StoreError::schema(format!(
                "table '{}' expects {} data fields, got {}",
                self.name,
                self.data.len(),
                data.len()
            )));
        }
        for (field, value) in self.data.iter().zip(data) {
            check_type(&field.name, field.value_type, value)?;
        }
        Ok(())
    }

    /// Check a scan prefix and return its explicit leading values.
    ///
    /// `None` is a wildcard for that field and every later one, so once a
    /// `None` appears no explicit value may follow it.
    pub fn check_prefix<'a>(&self, prefix: &'a [Option<Value>]) -> StoreResult<Vec<&'a Value>> {
        if prefix.len() > self.key.len() {
            return Err(StoreError::schema(format!(
                "prefix has {} fields but table '{}' has {} key fields",
                prefix.len(),
                self.name,
                self.key.len()
            )));
        }

        let explicit: Vec<&Value> = prefix.iter().map_while(Option::as_ref).collect();
        if let Some(pos) = prefix[explicit.len()..].iter().position(Option::is_some) {
            return Err(StoreError::schema(format!(
                "prefix value at position {} follows a wildcard",
                explicit.len() + pos
            )));
        }

        for (field, value) in self.key.iter().zip(&explicit) {
            check_type(&field.name, field.value_type, value)?;
        }
        Ok(explicit)
    }
}

fn check_type(name: &str, expected: ValueType, value: &Value) -> StoreResult<()> {
    let actual = value.value_type();
    if actual != expected {
        return Err(StoreError::schema(format!("field '{name}' expects {expected}, got {actual}")));
    }
    Ok(())
}

fn validate_name(kind: &str, name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::schema(format!("{kind} name cannot be empty")));
    }
    if name.len() > MAX_NAME_LENGTH_BYTES as usize {
        return Err(StoreError::schema(format!(
            "{kind} name '{name}' is {} bytes, max is {MAX_NAME_LENGTH_BYTES}",
            name.len()
        )));
    }
    Ok(())
}
