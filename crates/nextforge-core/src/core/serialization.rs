// crates/nextforge-core/src/core/serialization.rs
// ============================================================================
// Module: Nextforge Serialization Layer
// Description: Record translation to row form and document form.
// Purpose: Give both backend families one schema-driven storage mapping.
// Dependencies: serde_json, tracing
// ============================================================================

//! ## Overview
//! [`to_storage_form`] and [`from_storage_form`] translate between the shared
//! [`Record`] shape and a backend-neutral native representation: a [`Row`] of
//! [`SqlValue`] columns for relational backends or a [`Document`] of
//! [`DocValue`] entries for document backends. Backend crates only convert
//! these neutral forms to their driver types.
//!
//! Round-trip law: `from_storage_form(&to_storage_form(r, s, k)?, s, k) == r`
//! for every record `r` valid under schema `s`, with one documented
//! exception per backend kind:
//! - Document form preserves fields the schema does not declare in
//!   [`Record::extra`].
//! - Row form cannot hold undeclared fields; they are dropped with a warning
//!   on write and on read, so the law holds for records with empty `extra`.
//!
//! Row encoding: strings as TEXT, integers and timestamps (unix millis) as
//! INTEGER, floats as REAL, booleans as INTEGER 0/1, nested mappings as JSON
//! text with timestamps written as `{"$date": millis}`. Map keys beginning
//! with `$` are rejected on both paths.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Map as JsonMap;
use serde_json::Number;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::core::record::FieldValue;
use crate::core::record::KEY_FIELD;
use crate::core::record::Record;
use crate::core::record::RecordKey;
use crate::core::record::Timestamp;
use crate::core::schema::FieldSpec;
use crate::core::schema::FieldType;
use crate::core::schema::RecordSchema;
use crate::core::schema::SchemaError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Document field holding the canonical storage id.
pub const DOCUMENT_ID_FIELD: &str = "_id";

/// Marker key for timestamps embedded in JSON maps.
pub const JSON_DATE_KEY: &str = "$date";

// ============================================================================
// SECTION: Native Forms
// ============================================================================

/// Backend family selecting the storage form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Row/column storage.
    Relational,
    /// Document storage.
    Document,
}

impl BackendKind {
    /// Returns the stable label for the family.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relational column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
}

impl SqlValue {
    /// Returns a short label for error messages.
    #[must_use]
    pub const fn type_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
        }
    }
}

/// Relational row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Column values including [`KEY_FIELD`].
    pub columns: BTreeMap<String, SqlValue>,
}

/// Document value.
#[derive(Debug, Clone, PartialEq)]
pub enum DocValue {
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Millisecond date.
    DateTime(Timestamp),
    /// Embedded document.
    Document(BTreeMap<String, DocValue>),
}

impl DocValue {
    /// Returns a short label for error messages.
    #[must_use]
    pub const fn type_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::DateTime(_) => "datetime",
            Self::Document(_) => "document",
        }
    }
}

/// Top-level document keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Document fields including [`DOCUMENT_ID_FIELD`].
    pub fields: BTreeMap<String, DocValue>,
}

/// Native storage representation.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageForm {
    /// Relational row.
    Row(Row),
    /// Document.
    Document(Document),
}

impl StorageForm {
    /// Returns the backend family the form belongs to.
    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::Row(_) => BackendKind::Relational,
            Self::Document(_) => BackendKind::Document,
        }
    }
}

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Converts a record into the native form of the backend kind.
///
/// # Errors
///
/// Returns [`SchemaError`] when the record does not satisfy the schema,
/// contains a non-finite float, or uses a reserved map key.
pub fn to_storage_form(
    record: &Record,
    schema: &RecordSchema,
    kind: BackendKind,
) -> Result<StorageForm, SchemaError> {
    schema.check_record(record)?;
    check_extra_names(record, schema)?;
    match kind {
        BackendKind::Relational => Ok(StorageForm::Row(encode_row(record, schema)?)),
        BackendKind::Document => Ok(StorageForm::Document(encode_document(record)?)),
    }
}

/// Converts a native form back into a record.
///
/// # Errors
///
/// Returns [`SchemaError`] when the form does not match the backend kind,
/// a stored value does not match the declared type, or a required field is
/// absent.
pub fn from_storage_form(
    form: &StorageForm,
    schema: &RecordSchema,
    kind: BackendKind,
) -> Result<Record, SchemaError> {
    match (form, kind) {
        (StorageForm::Row(row), BackendKind::Relational) => decode_row(row, schema),
        (StorageForm::Document(document), BackendKind::Document) => {
            decode_document(document, schema)
        }
        (form, kind) => Err(SchemaError::new("<form>", kind.as_str(), form.kind().as_str())),
    }
}

// ============================================================================
// SECTION: Row Form
// ============================================================================

/// Encodes a record as a relational row.
fn encode_row(record: &Record, schema: &RecordSchema) -> Result<Row, SchemaError> {
    let mut columns = BTreeMap::new();
    columns.insert(KEY_FIELD.to_string(), SqlValue::Text(record.key.storage_id()));
    for spec in &schema.fields {
        let value = match record.fields.get(&spec.name) {
            Some(value) => field_to_sql(&spec.name, value)?,
            None => SqlValue::Null,
        };
        columns.insert(spec.name.clone(), value);
    }
    for name in record.extra.keys() {
        warn!(
            collection = %schema.collection,
            field = %name,
            "dropping field not declared by relational schema"
        );
    }
    Ok(Row {
        columns,
    })
}

/// Converts a field value into a column value.
fn field_to_sql(field: &str, value: &FieldValue) -> Result<SqlValue, SchemaError> {
    Ok(match value {
        FieldValue::String(text) => SqlValue::Text(text.clone()),
        FieldValue::Integer(number) => SqlValue::Integer(*number),
        FieldValue::Float(number) => SqlValue::Real(finite(field, *number)?),
        FieldValue::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        FieldValue::Timestamp(ts) => SqlValue::Integer(ts.as_unix_millis()),
        FieldValue::Map(map) => {
            let json = map_to_json(field, map)?;
            SqlValue::Text(JsonValue::Object(json).to_string())
        }
    })
}

/// Decodes a relational row into a record.
fn decode_row(row: &Row, schema: &RecordSchema) -> Result<Record, SchemaError> {
    let key = match row.columns.get(KEY_FIELD) {
        Some(SqlValue::Text(id)) => parse_key(id)?,
        Some(other) => return Err(SchemaError::new(KEY_FIELD, "text", other.type_label())),
        None => return Err(SchemaError::new(KEY_FIELD, "text", "missing")),
    };
    let mut record = Record::new(key);
    for spec in &schema.fields {
        match row.columns.get(&spec.name) {
            None | Some(SqlValue::Null) => require_optional(spec)?,
            Some(value) => {
                record.fields.insert(spec.name.clone(), sql_to_field(spec, value)?);
            }
        }
    }
    for name in row.columns.keys() {
        if name != KEY_FIELD && schema.field_spec(name).is_none() {
            warn!(
                collection = %schema.collection,
                column = %name,
                "dropping column not declared by relational schema"
            );
        }
    }
    Ok(record)
}

/// Converts a column value into the declared field type.
fn sql_to_field(spec: &FieldSpec, value: &SqlValue) -> Result<FieldValue, SchemaError> {
    let mismatch = || SchemaError::new(&spec.name, spec.field_type.as_str(), value.type_label());
    match (spec.field_type, value) {
        (FieldType::String, SqlValue::Text(text)) => Ok(FieldValue::String(text.clone())),
        (FieldType::Integer, SqlValue::Integer(number)) => Ok(FieldValue::Integer(*number)),
        (FieldType::Float, SqlValue::Real(number)) => Ok(FieldValue::Float(*number)),
        (FieldType::Float, SqlValue::Integer(number)) => Ok(FieldValue::Float(int_to_float(*number))),
        (FieldType::Bool, SqlValue::Integer(0)) => Ok(FieldValue::Bool(false)),
        (FieldType::Bool, SqlValue::Integer(1)) => Ok(FieldValue::Bool(true)),
        (FieldType::Timestamp, SqlValue::Integer(millis)) => {
            Ok(FieldValue::Timestamp(Timestamp::from_unix_millis(*millis)))
        }
        (FieldType::Map, SqlValue::Text(text)) => {
            let parsed: JsonValue = serde_json::from_str(text)
                .map_err(|_| SchemaError::new(&spec.name, "map", "malformed json"))?;
            match parsed {
                JsonValue::Object(map) => Ok(FieldValue::Map(json_to_map(&spec.name, &map)?)),
                other => Err(SchemaError::new(&spec.name, "map", json_label(&other))),
            }
        }
        _ => Err(mismatch()),
    }
}

// ============================================================================
// SECTION: Document Form
// ============================================================================

/// Encodes a record as a document, including undeclared fields.
fn encode_document(record: &Record) -> Result<Document, SchemaError> {
    let mut fields = BTreeMap::new();
    fields.insert(DOCUMENT_ID_FIELD.to_string(), DocValue::String(record.key.storage_id()));
    for (name, value) in record.fields.iter().chain(record.extra.iter()) {
        fields.insert(name.clone(), field_to_doc(name, value)?);
    }
    Ok(Document {
        fields,
    })
}

/// Converts a field value into a document value.
fn field_to_doc(field: &str, value: &FieldValue) -> Result<DocValue, SchemaError> {
    Ok(match value {
        FieldValue::String(text) => DocValue::String(text.clone()),
        FieldValue::Integer(number) => DocValue::Int(*number),
        FieldValue::Float(number) => DocValue::Float(finite(field, *number)?),
        FieldValue::Bool(flag) => DocValue::Bool(*flag),
        FieldValue::Timestamp(ts) => DocValue::DateTime(*ts),
        FieldValue::Map(map) => {
            let mut nested = BTreeMap::new();
            for (key, value) in map {
                check_map_key(field, key)?;
                nested.insert(key.clone(), field_to_doc(field, value)?);
            }
            DocValue::Document(nested)
        }
    })
}

/// Decodes a document into a record, preserving undeclared fields.
fn decode_document(document: &Document, schema: &RecordSchema) -> Result<Record, SchemaError> {
    let key = match document.fields.get(DOCUMENT_ID_FIELD) {
        Some(DocValue::String(id)) => parse_key(id)?,
        Some(other) => {
            return Err(SchemaError::new(DOCUMENT_ID_FIELD, "string", other.type_label()));
        }
        None => return Err(SchemaError::new(DOCUMENT_ID_FIELD, "string", "missing")),
    };
    let mut record = Record::new(key);
    for spec in &schema.fields {
        match document.fields.get(&spec.name) {
            None | Some(DocValue::Null) => require_optional(spec)?,
            Some(value) => {
                record.fields.insert(spec.name.clone(), doc_to_declared(spec, value)?);
            }
        }
    }
    for (name, value) in &document.fields {
        if name == DOCUMENT_ID_FIELD || schema.field_spec(name).is_some() {
            continue;
        }
        if let Some(value) = doc_to_opaque(&schema.collection, name, value)? {
            record.extra.insert(name.clone(), value);
        }
    }
    Ok(record)
}

/// Converts a document value into the declared field type.
fn doc_to_declared(spec: &FieldSpec, value: &DocValue) -> Result<FieldValue, SchemaError> {
    match (spec.field_type, value) {
        (FieldType::String, DocValue::String(text)) => Ok(FieldValue::String(text.clone())),
        (FieldType::Integer, DocValue::Int(number)) => Ok(FieldValue::Integer(*number)),
        (FieldType::Float, DocValue::Float(number)) => Ok(FieldValue::Float(*number)),
        (FieldType::Float, DocValue::Int(number)) => Ok(FieldValue::Float(int_to_float(*number))),
        (FieldType::Bool, DocValue::Bool(flag)) => Ok(FieldValue::Bool(*flag)),
        (FieldType::Timestamp, DocValue::DateTime(ts)) => Ok(FieldValue::Timestamp(*ts)),
        (FieldType::Map, DocValue::Document(_)) => {
            match doc_to_opaque(&spec.name, &spec.name, value)? {
                Some(map) => Ok(map),
                None => Err(SchemaError::new(&spec.name, "map", "null")),
            }
        }
        _ => Err(SchemaError::new(&spec.name, spec.field_type.as_str(), value.type_label())),
    }
}

/// Converts an undeclared document value, dropping nulls the record model
/// cannot represent.
fn doc_to_opaque(
    scope: &str,
    field: &str,
    value: &DocValue,
) -> Result<Option<FieldValue>, SchemaError> {
    Ok(Some(match value {
        DocValue::Null => {
            warn!(scope = %scope, field = %field, "dropping null document value");
            return Ok(None);
        }
        DocValue::Bool(flag) => FieldValue::Bool(*flag),
        DocValue::Int(number) => FieldValue::Integer(*number),
        DocValue::Float(number) => FieldValue::Float(*number),
        DocValue::String(text) => FieldValue::String(text.clone()),
        DocValue::DateTime(ts) => FieldValue::Timestamp(*ts),
        DocValue::Document(nested) => {
            let mut map = BTreeMap::new();
            for (key, value) in nested {
                check_map_key(field, key)?;
                if let Some(value) = doc_to_opaque(scope, field, value)? {
                    map.insert(key.clone(), value);
                }
            }
            FieldValue::Map(map)
        }
    }))
}

// ============================================================================
// SECTION: JSON Maps
// ============================================================================

/// Converts a nested map to a JSON object.
fn map_to_json(
    field: &str,
    map: &BTreeMap<String, FieldValue>,
) -> Result<JsonMap<String, JsonValue>, SchemaError> {
    let mut out = JsonMap::new();
    for (key, value) in map {
        check_map_key(field, key)?;
        let json = match value {
            FieldValue::String(text) => JsonValue::String(text.clone()),
            FieldValue::Integer(number) => JsonValue::from(*number),
            FieldValue::Float(number) => Number::from_f64(finite(field, *number)?)
                .map(JsonValue::Number)
                .ok_or_else(|| SchemaError::new(field, "float", "non-finite float"))?,
            FieldValue::Bool(flag) => JsonValue::Bool(*flag),
            FieldValue::Timestamp(ts) => {
                let mut date = JsonMap::new();
                date.insert(JSON_DATE_KEY.to_string(), JsonValue::from(ts.as_unix_millis()));
                JsonValue::Object(date)
            }
            FieldValue::Map(nested) => JsonValue::Object(map_to_json(field, nested)?),
        };
        out.insert(key.clone(), json);
    }
    Ok(out)
}

/// Converts a JSON object back into a nested map.
fn json_to_map(
    field: &str,
    map: &JsonMap<String, JsonValue>,
) -> Result<BTreeMap<String, FieldValue>, SchemaError> {
    let mut out = BTreeMap::new();
    for (key, value) in map {
        check_map_key(field, key)?;
        let converted = match value {
            JsonValue::String(text) => FieldValue::String(text.clone()),
            JsonValue::Bool(flag) => FieldValue::Bool(*flag),
            JsonValue::Number(number) => {
                if let Some(int) = number.as_i64() {
                    FieldValue::Integer(int)
                } else if number.is_f64()
                    && let Some(float) = number.as_f64()
                {
                    FieldValue::Float(float)
                } else {
                    return Err(SchemaError::new(field, "integer", "out of range number"));
                }
            }
            JsonValue::Object(nested) => match date_marker(nested) {
                Some(millis) => FieldValue::Timestamp(Timestamp::from_unix_millis(millis)),
                None => FieldValue::Map(json_to_map(field, nested)?),
            },
            other => return Err(SchemaError::new(field, "map value", json_label(other))),
        };
        out.insert(key.clone(), converted);
    }
    Ok(out)
}

/// Returns the millis of a `{"$date": millis}` marker object.
fn date_marker(map: &JsonMap<String, JsonValue>) -> Option<i64> {
    if map.len() != 1 {
        return None;
    }
    map.get(JSON_DATE_KEY).and_then(JsonValue::as_i64)
}

/// Returns a short label for a JSON value.
const fn json_label(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a storage id into a record key.
fn parse_key(id: &str) -> Result<RecordKey, SchemaError> {
    RecordKey::from_storage_id(id).map_err(|_| SchemaError::new(KEY_FIELD, "storage id", "malformed"))
}

/// Accepts an absent value only for optional fields.
fn require_optional(spec: &FieldSpec) -> Result<(), SchemaError> {
    if spec.optional {
        Ok(())
    } else {
        Err(SchemaError::new(&spec.name, spec.field_type.as_str(), "null"))
    }
}

/// Rejects NaN and infinite floats.
fn finite(field: &str, value: f64) -> Result<f64, SchemaError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SchemaError::new(field, "float", "non-finite float"))
    }
}

/// Rejects map keys reserved for type markers.
fn check_map_key(field: &str, key: &str) -> Result<(), SchemaError> {
    if key.starts_with('$') {
        return Err(SchemaError::new(field, "map key", "reserved $-prefixed key"));
    }
    Ok(())
}

/// Rejects undeclared fields that collide with declared or reserved names.
fn check_extra_names(record: &Record, schema: &RecordSchema) -> Result<(), SchemaError> {
    for name in record.extra.keys() {
        if schema.field_spec(name).is_some() || name == KEY_FIELD || name == DOCUMENT_ID_FIELD {
            return Err(SchemaError::new(name, "undeclared", "declared or reserved name"));
        }
        check_map_key(name, name)?;
    }
    Ok(())
}

/// Widens an integer stored in a float field.
#[allow(clippy::cast_precision_loss, reason = "Float fields tolerate integral storage values.")]
fn int_to_float(value: i64) -> f64 {
    value as f64
}

// ============================================================================
// SECTION: Tests
// ============================================================================
