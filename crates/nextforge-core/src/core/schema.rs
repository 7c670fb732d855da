// crates/nextforge-core/src/core/schema.rs
// ============================================================================
// Module: Nextforge Record Schemas
// Description: Declarative collection schemas shared by every backend.
// Purpose: Describe field types, optionality, and indexes as plain data.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A [`RecordSchema`] names a collection (table or document collection), its
//! typed fields, and its indexes. Schemas are declared as data, either in
//! code or in configuration, and drive both the serialization layer and the
//! native schema each backend maintains.
//!
//! Invariants:
//! - Collection, field, and index names are plain identifiers, so they are
//!   safe to embed in quoted SQL identifiers and document field paths.
//! - Index fields refer to declared scalar fields.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::record::KEY_FIELD;
use crate::core::record::Record;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum identifier length for collections, fields, and indexes.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Field names reserved by storage backends.
const RESERVED_FIELDS: [&str; 2] = [KEY_FIELD, "_id"];

// ============================================================================
// SECTION: Field Types
// ============================================================================

/// Field types supported by the record model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// Finite 64-bit float.
    Float,
    /// Boolean.
    Bool,
    /// Millisecond timestamp.
    Timestamp,
    /// Nested mapping.
    Map,
}

impl FieldType {
    /// Returns the stable type label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Timestamp => "timestamp",
            Self::Map => "map",
        }
    }

    /// Returns true when values of the type can be indexed and range-filtered.
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        !matches!(self, Self::Map)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Schema Structures
// ============================================================================

/// Declared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Field type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the field may be absent.
    #[serde(default)]
    pub optional: bool,
}

/// Declared index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name, unique within the collection.
    pub name: String,
    /// Whether the index enforces uniqueness.
    #[serde(default)]
    pub unique: bool,
    /// Indexed fields in order.
    pub fields: Vec<String>,
}

/// Collection schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    /// Collection or table name.
    pub collection: String,
    /// Declared fields.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Declared indexes.
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl RecordSchema {
    /// Creates an empty schema for a collection.
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Adds a required field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            optional: false,
        });
        self
    }

    /// Adds an optional field.
    #[must_use]
    pub fn optional_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            optional: true,
        });
        self
    }

    /// Adds a non-unique index.
    #[must_use]
    pub fn index(mut self, name: impl Into<String>, fields: &[&str]) -> Self {
        self.indexes.push(IndexSpec {
            name: name.into(),
            unique: false,
            fields: fields.iter().map(|field| (*field).to_string()).collect(),
        });
        self
    }

    /// Adds a unique index.
    #[must_use]
    pub fn unique_index(mut self, name: impl Into<String>, fields: &[&str]) -> Self {
        self.indexes.push(IndexSpec {
            name: name.into(),
            unique: true,
            fields: fields.iter().map(|field| (*field).to_string()).collect(),
        });
        self
    }

    /// Returns the declared field with the given name.
    #[must_use]
    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Returns true when the field participates in any index.
    #[must_use]
    pub fn is_indexed(&self, name: &str) -> bool {
        self.indexes.iter().any(|index| index.fields.iter().any(|field| field == name))
    }

    /// Validates the schema definition.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaDefinitionError`] when names are invalid or duplicated
    /// or indexes reference undeclared or non-scalar fields.
    pub fn validate(&self) -> Result<(), SchemaDefinitionError> {
        validate_identifier(&self.collection, "collection")?;
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            validate_identifier(&field.name, &self.collection)?;
            if RESERVED_FIELDS.contains(&field.name.as_str()) {
                return Err(SchemaDefinitionError::Reserved(field.name.clone()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaDefinitionError::Duplicate(field.name.clone()));
            }
        }
        let mut index_names = BTreeSet::new();
        for index in &self.indexes {
            validate_identifier(&index.name, &self.collection)?;
            if !index_names.insert(index.name.as_str()) {
                return Err(SchemaDefinitionError::Duplicate(index.name.clone()));
            }
            if index.fields.is_empty() {
                return Err(SchemaDefinitionError::InvalidIndex {
                    index: index.name.clone(),
                    reason: "index must name at least one field".to_string(),
                });
            }
            for name in &index.fields {
                let Some(spec) = self.field_spec(name) else {
                    return Err(SchemaDefinitionError::InvalidIndex {
                        index: index.name.clone(),
                        reason: format!("unknown field {name}"),
                    });
                };
                if !spec.field_type.is_scalar() {
                    return Err(SchemaDefinitionError::InvalidIndex {
                        index: index.name.clone(),
                        reason: format!("field {name} is not indexable"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Checks a record's declared fields against the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when a required field is missing, a field has
    /// the wrong type, or an undeclared field is stored in `fields`.
    pub fn check_record(&self, record: &Record) -> Result<(), SchemaError> {
        for spec in &self.fields {
            match record.fields.get(&spec.name) {
                Some(value) if value.field_type() != spec.field_type => {
                    return Err(SchemaError::new(
                        &spec.name,
                        spec.field_type.as_str(),
                        value.field_type().as_str(),
                    ));
                }
                None if !spec.optional => {
                    return Err(SchemaError::new(&spec.name, spec.field_type.as_str(), "missing"));
                }
                _ => {}
            }
        }
        for (name, value) in &record.fields {
            if self.field_spec(name).is_none() {
                return Err(SchemaError::new(name, "undeclared", value.field_type().as_str()));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when a schema definition is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaDefinitionError {
    /// Identifier is empty, too long, or has invalid characters.
    #[error("invalid identifier {name} in {scope}")]
    InvalidIdentifier {
        /// Offending identifier.
        name: String,
        /// Collection or context the identifier belongs to.
        scope: String,
    },
    /// Field uses a reserved name.
    #[error("field name {0} is reserved")]
    Reserved(String),
    /// Field or index declared twice.
    #[error("duplicate name {0}")]
    Duplicate(String),
    /// Index references invalid fields.
    #[error("invalid index {index}: {reason}")]
    InvalidIndex {
        /// Index name.
        index: String,
        /// Rejection reason.
        reason: String,
    },
}

/// Record-level type error raised by the serialization layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema error on field {field}: expected {expected_type}, found {actual_type}")]
pub struct SchemaError {
    /// Field name.
    pub field: String,
    /// Type the schema declares.
    pub expected_type: String,
    /// Type found in the record or storage.
    pub actual_type: String,
}

impl SchemaError {
    /// Builds a schema error.
    #[must_use]
    pub fn new(field: &str, expected_type: &str, actual_type: &str) -> Self {
        Self {
            field: field.to_string(),
            expected_type: expected_type.to_string(),
            actual_type: actual_type.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`).
fn validate_identifier(name: &str, scope: &str) -> Result<(), SchemaDefinitionError> {
    let mut bytes = name.bytes();
    let valid_start = bytes.next().is_some_and(|byte| byte.is_ascii_alphabetic() || byte == b'_');
    let valid_rest = bytes.all(|byte| byte.is_ascii_alphanumeric() || byte == b'_');
    if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(SchemaDefinitionError::InvalidIdentifier {
            name: name.to_string(),
            scope: scope.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
