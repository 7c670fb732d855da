// crates/nextforge-core/src/core/record.rs
// ============================================================================
// Module: Nextforge Record Model
// Description: Keys, typed field values, and records shared by all backends.
// Purpose: Provide the caller-owned record shape the store contract operates on.
// Dependencies: time, thiserror
// ============================================================================

//! ## Overview
//! A [`Record`] is a stable [`RecordKey`] plus typed fields. Fields declared
//! by the collection schema live in `fields`; fields a backend found in
//! storage but the schema does not declare live in `extra` (document stores
//! only, see [`crate::core::serialization`]).
//!
//! Keys map to a canonical storage id: parts are escaped and joined with `:`
//! so single and composite keys never collide and ids sort consistently on
//! every backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::schema::FieldType;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Reserved field name addressing the record key in filters and storage.
pub const KEY_FIELD: &str = "_key";

/// Storage id separator between composite key parts.
const KEY_SEPARATOR: char = ':';

/// Escape character inside storage ids.
const KEY_ESCAPE: char = '\\';

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Self(i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX))
    }

    /// Formats the timestamp as RFC 3339, when representable.
    #[must_use]
    pub fn to_rfc3339(self) -> Option<String> {
        let nanos = i128::from(self.0) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?.format(&Rfc3339).ok()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Some(text) => f.write_str(&text),
            None => write!(f, "{}ms", self.0),
        }
    }
}

// ============================================================================
// SECTION: Field Values
// ============================================================================

/// Typed field value.
///
/// There is no null variant: an absent optional field is represented by the
/// field being missing from the record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// UTF-8 string.
    String(String),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Finite 64-bit float.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Millisecond timestamp.
    Timestamp(Timestamp),
    /// Nested mapping.
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Returns the schema type of the value.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::String(_) => FieldType::String,
            Self::Integer(_) => FieldType::Integer,
            Self::Float(_) => FieldType::Float,
            Self::Bool(_) => FieldType::Bool,
            Self::Timestamp(_) => FieldType::Timestamp,
            Self::Map(_) => FieldType::Map,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Timestamp> for FieldValue {
    fn from(value: Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

impl From<BTreeMap<String, Self>> for FieldValue {
    fn from(value: BTreeMap<String, Self>) -> Self {
        Self::Map(value)
    }
}

// ============================================================================
// SECTION: Record Keys
// ============================================================================

/// Errors raised when constructing or parsing record keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// Key part is empty.
    #[error("record key parts must be non-empty")]
    EmptyPart,
    /// Composite key has fewer than two parts.
    #[error("composite keys require at least two parts, found {0}")]
    CompositeArity(usize),
    /// Storage id ends with a dangling escape.
    #[error("storage id has a dangling escape: {0}")]
    DanglingEscape(String),
}

/// Stable record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    /// Single string key.
    Single(String),
    /// Ordered composite key with at least two parts.
    Composite(Vec<String>),
}

impl RecordKey {
    /// Creates a single key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::EmptyPart`] when the key is empty.
    pub fn single(value: impl Into<String>) -> Result<Self, KeyError> {
        let value = value.into();
        if value.is_empty() {
            return Err(KeyError::EmptyPart);
        }
        Ok(Self::Single(value))
    }

    /// Creates a composite key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when fewer than two parts are supplied or a part
    /// is empty.
    pub fn composite<I, S>(parts: I) -> Result<Self, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        if parts.len() < 2 {
            return Err(KeyError::CompositeArity(parts.len()));
        }
        if parts.iter().any(String::is_empty) {
            return Err(KeyError::EmptyPart);
        }
        Ok(Self::Composite(parts))
    }

    /// Returns the key parts in order.
    #[must_use]
    pub fn parts(&self) -> &[String] {
        match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Composite(parts) => parts,
        }
    }

    /// Returns the canonical storage id.
    #[must_use]
    pub fn storage_id(&self) -> String {
        let mut out = String::new();
        for (index, part) in self.parts().iter().enumerate() {
            if index > 0 {
                out.push(KEY_SEPARATOR);
            }
            for ch in part.chars() {
                if ch == KEY_SEPARATOR || ch == KEY_ESCAPE {
                    out.push(KEY_ESCAPE);
                }
                out.push(ch);
            }
        }
        out
    }

    /// Parses a canonical storage id back into a key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the id is malformed.
    pub fn from_storage_id(id: &str) -> Result<Self, KeyError> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut chars = id.chars();
        while let Some(ch) = chars.next() {
            match ch {
                KEY_ESCAPE => match chars.next() {
                    Some(next) => current.push(next),
                    None => return Err(KeyError::DanglingEscape(id.to_string())),
                },
                KEY_SEPARATOR => parts.push(std::mem::take(&mut current)),
                other => current.push(other),
            }
        }
        parts.push(current);
        if parts.len() == 1 {
            return Self::single(parts.remove(0));
        }
        Self::composite(parts)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_id())
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Domain record persisted through the store contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Stable record key.
    pub key: RecordKey,
    /// Schema-declared fields.
    pub fields: BTreeMap<String, FieldValue>,
    /// Fields present in storage but not declared by the schema.
    pub extra: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Creates an empty record for the key.
    #[must_use]
    pub const fn new(key: RecordKey) -> Self {
        Self {
            key,
            fields: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Returns the record with a field set.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns a declared field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
