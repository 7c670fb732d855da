// crates/nextforge-core/src/core/filter.rs
// ============================================================================
// Module: Nextforge Filter Language
// Description: Conjunctive equality and range predicates over indexed fields.
// Purpose: Express list filters once and translate them per backend family.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! A [`Filter`] is a conjunction of [`Predicate`]s. Each predicate compares
//! the record key (`_key`, compared by storage id) or an indexed scalar field
//! against a value of the field's declared type. Relational backends render
//! filters as `WHERE` clauses; document backends render query documents. The
//! in-process [`Filter::matches`] evaluation defines the reference semantics
//! both must agree with:
//! - A record missing the field never matches a predicate on it.
//! - Strings compare by byte order, booleans as `false < true`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

use crate::core::record::FieldValue;
use crate::core::record::KEY_FIELD;
use crate::core::record::Record;
use crate::core::schema::FieldType;
use crate::core::schema::RecordSchema;

// ============================================================================
// SECTION: Operators
// ============================================================================

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    /// Equal.
    Eq,
    /// Strictly greater.
    Gt,
    /// Greater or equal.
    Gte,
    /// Strictly less.
    Lt,
    /// Less or equal.
    Lte,
}

impl ComparisonOp {
    /// Returns the SQL operator token.
    #[must_use]
    pub const fn sql_token(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Returns the query-document operator name.
    #[must_use]
    pub const fn document_operator(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }

    /// Returns true when `ordering` (stored value compared to the operand)
    /// satisfies the operator.
    #[must_use]
    pub const fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => matches!(ordering, Ordering::Equal),
            Self::Gt => matches!(ordering, Ordering::Greater),
            Self::Gte => !matches!(ordering, Ordering::Less),
            Self::Lt => matches!(ordering, Ordering::Less),
            Self::Lte => !matches!(ordering, Ordering::Greater),
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_token())
    }
}

// ============================================================================
// SECTION: Predicates and Filters
// ============================================================================

/// Single comparison predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Field name or [`KEY_FIELD`].
    pub field: String,
    /// Comparison operator.
    pub op: ComparisonOp,
    /// Operand.
    pub value: FieldValue,
}

impl Predicate {
    /// Returns true when the predicate targets the record key.
    #[must_use]
    pub fn is_key(&self) -> bool {
        self.field == KEY_FIELD
    }
}

/// Conjunction of predicates. An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Predicates joined with logical AND.
    predicates: Vec<Predicate>,
}

impl Filter {
    /// Returns a filter matching every record.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// Adds a predicate.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, op: ComparisonOp, value: impl Into<FieldValue>) -> Self {
        self.predicates.push(Predicate {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Adds an equality predicate.
    #[must_use]
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with(field, ComparisonOp::Eq, value)
    }

    /// Adds a `>` predicate.
    #[must_use]
    pub fn where_gt(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with(field, ComparisonOp::Gt, value)
    }

    /// Adds a `>=` predicate.
    #[must_use]
    pub fn where_gte(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with(field, ComparisonOp::Gte, value)
    }

    /// Adds a `<` predicate.
    #[must_use]
    pub fn where_lt(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with(field, ComparisonOp::Lt, value)
    }

    /// Adds a `<=` predicate.
    #[must_use]
    pub fn where_lte(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with(field, ComparisonOp::Lte, value)
    }

    /// Returns the predicates.
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Validates the filter against a schema.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] when a predicate targets an unknown or
    /// unindexed field, or the operand type does not match the field type.
    pub fn validate(&self, schema: &RecordSchema) -> Result<(), FilterError> {
        for predicate in &self.predicates {
            let expected = if predicate.is_key() {
                FieldType::String
            } else {
                let Some(spec) = schema.field_spec(&predicate.field) else {
                    return Err(FilterError::UnknownField(predicate.field.clone()));
                };
                if !schema.is_indexed(&predicate.field) {
                    return Err(FilterError::NotIndexed(predicate.field.clone()));
                }
                spec.field_type
            };
            let actual = predicate.value.field_type();
            if actual != expected {
                return Err(FilterError::TypeMismatch {
                    field: predicate.field.clone(),
                    expected,
                    actual,
                });
            }
            if let FieldValue::Float(value) = predicate.value
                && !value.is_finite()
            {
                return Err(FilterError::NonFinite(predicate.field.clone()));
            }
        }
        Ok(())
    }

    /// Evaluates the filter against a record.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.predicates.iter().all(|predicate| {
            let ordering = if predicate.is_key() {
                match &predicate.value {
                    FieldValue::String(operand) => Some(record.key.storage_id().as_str().cmp(operand)),
                    _ => None,
                }
            } else {
                record.fields.get(&predicate.field).and_then(|value| compare(value, &predicate.value))
            };
            ordering.is_some_and(|ordering| predicate.op.accepts(ordering))
        })
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when a filter does not fit the schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Field is not declared.
    #[error("filter references unknown field {0}")]
    UnknownField(String),
    /// Field is declared but not indexed.
    #[error("filter field {0} is not indexed")]
    NotIndexed(String),
    /// Operand type does not match the field type.
    #[error("filter on {field} expects {expected}, found {actual}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Declared type.
        expected: FieldType,
        /// Operand type.
        actual: FieldType,
    },
    /// Float operand is NaN or infinite.
    #[error("filter on {0} uses a non-finite float")]
    NonFinite(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Compares two scalar values of the same type.
fn compare(stored: &FieldValue, operand: &FieldValue) -> Option<Ordering> {
    match (stored, operand) {
        (FieldValue::String(left), FieldValue::String(right)) => Some(left.as_str().cmp(right)),
        (FieldValue::Integer(left), FieldValue::Integer(right)) => Some(left.cmp(right)),
        (FieldValue::Float(left), FieldValue::Float(right)) => left.partial_cmp(right),
        (FieldValue::Bool(left), FieldValue::Bool(right)) => Some(left.cmp(right)),
        (FieldValue::Timestamp(left), FieldValue::Timestamp(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::*;
    use crate::core::record::RecordKey;

    fn schema() -> RecordSchema {
        RecordSchema::new("players")
            .field("name", FieldType::String)
            .field("balance", FieldType::Integer)
            .optional_field("tier", FieldType::String)
            .index("by_balance", &["balance"])
            .index("by_tier", &["tier"])
    }

    fn player(key: &str, balance: i64) -> Record {
        Record::new(RecordKey::single(key).unwrap())
            .with_field("name", key)
            .with_field("balance", balance)
    }

    #[test]
    fn validate_rejects_unindexed_and_mistyped_predicates() {
        let schema = schema();
        assert_eq!(
            Filter::all().where_eq("name", "x").validate(&schema),
            Err(FilterError::NotIndexed("name".to_string()))
        );
        assert!(matches!(
            Filter::all().where_eq("balance", "100").validate(&schema),
            Err(FilterError::TypeMismatch { .. })
        ));
        assert!(Filter::all().where_eq("missing", 1_i64).validate(&schema).is_err());
        Filter::all().where_gte("balance", 10_i64).where_eq(KEY_FIELD, "p1").validate(&schema).unwrap();
    }

    #[test]
    fn range_predicates_combine_conjunctively() {
        let filter = Filter::all().where_gte("balance", 50_i64).where_lt("balance", 150_i64);
        assert!(filter.matches(&player("p1", 100)));
        assert!(filter.matches(&player("p2", 50)));
        assert!(!filter.matches(&player("p3", 150)));
    }

    #[test]
    fn missing_optional_field_never_matches() {
        let filter = Filter::all().where_lt("tier", "zzz");
        assert!(!filter.matches(&player("p1", 1)));
        assert!(filter.matches(&player("p1", 1).with_field("tier", "gold")));
    }

    #[test]
    fn key_predicates_compare_storage_ids() {
        let filter = Filter::all().where_gte(KEY_FIELD, "p2");
        assert!(!filter.matches(&player("p1", 1)));
        assert!(filter.matches(&player("p3", 1)));
    }
}
