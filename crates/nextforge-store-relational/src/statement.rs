// crates/nextforge-store-relational/src/statement.rs
// ============================================================================
// Module: Nextforge SQL Statements
// Description: DDL and DML text for record tables.
// Purpose: Translate schemas and filters into parameterized SQL.
// Dependencies: nextforge-core
// ============================================================================

//! ## Overview
//! Every statement is parameterized with `?` placeholders; identifiers come
//! from validated schemas and are quoted by the dialect. Filters become a
//! conjunctive `WHERE` clause, and paging is keyset-based on the `_key`
//! column so a page never depends on an offset.

// ============================================================================
// SECTION: Imports
// ============================================================================

use nextforge_core::FieldSpec;
use nextforge_core::FieldValue;
use nextforge_core::Filter;
use nextforge_core::IndexSpec;
use nextforge_core::KEY_FIELD;
use nextforge_core::RecordSchema;
use nextforge_core::SqlValue;

use crate::dialect::SqlDialect;

// ============================================================================
// SECTION: Columns
// ============================================================================

/// Returns the column names in statement order: `_key`, then fields.
#[must_use]
pub fn columns(schema: &RecordSchema) -> Vec<&str> {
    std::iter::once(KEY_FIELD).chain(schema.fields.iter().map(|spec| spec.name.as_str())).collect()
}

/// Returns the quoted, comma-joined column list.
fn column_list(dialect: SqlDialect, schema: &RecordSchema) -> String {
    columns(schema).iter().map(|name| dialect.quote(name)).collect::<Vec<_>>().join(", ")
}

/// Returns the column definition for a field.
fn column_definition(dialect: SqlDialect, schema: &RecordSchema, spec: &FieldSpec) -> String {
    let mut definition = format!(
        "{} {}",
        dialect.quote(&spec.name),
        dialect.column_type(spec.field_type, schema.is_indexed(&spec.name))
    );
    if !spec.optional {
        definition.push_str(" NOT NULL");
    }
    definition
}

// ============================================================================
// SECTION: DDL
// ============================================================================

/// Builds `CREATE TABLE IF NOT EXISTS` for a collection.
#[must_use]
pub fn create_table(dialect: SqlDialect, schema: &RecordSchema) -> String {
    let mut definitions =
        vec![format!("{} {} NOT NULL PRIMARY KEY", dialect.quote(KEY_FIELD), dialect.key_column_type())];
    definitions.extend(schema.fields.iter().map(|spec| column_definition(dialect, schema, spec)));
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}){}",
        dialect.quote(&schema.collection),
        definitions.join(", "),
        dialect.table_options()
    )
}

/// Builds `ALTER TABLE ... ADD COLUMN` for an optional field.
#[must_use]
pub fn add_column(dialect: SqlDialect, schema: &RecordSchema, spec: &FieldSpec) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        dialect.quote(&schema.collection),
        column_definition(dialect, schema, spec)
    )
}

/// Builds `CREATE [UNIQUE] INDEX` for an index.
#[must_use]
pub fn create_index(dialect: SqlDialect, schema: &RecordSchema, index: &IndexSpec) -> String {
    let fields = index.fields.iter().map(|field| dialect.quote(field)).collect::<Vec<_>>().join(", ");
    format!(
        "CREATE {}INDEX {} ON {} ({fields})",
        if index.unique { "UNIQUE " } else { "" },
        dialect.quote(&dialect.index_name(&schema.collection, &index.name)),
        dialect.quote(&schema.collection)
    )
}

// ============================================================================
// SECTION: DML
// ============================================================================

/// Builds a full-row upsert; parameters follow [`columns`].
///
/// Only a conflict on `_key` updates the existing row; a conflict on a
/// unique index fails the statement instead of replacing the other row.
#[must_use]
pub fn upsert(dialect: SqlDialect, schema: &RecordSchema) -> String {
    let placeholders = vec!["?"; schema.fields.len() + 1].join(", ");
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        dialect.quote(&schema.collection),
        column_list(dialect, schema)
    );
    let key = dialect.quote(KEY_FIELD);
    match dialect {
        SqlDialect::Sqlite => {
            let assignments = schema
                .fields
                .iter()
                .map(|spec| {
                    let column = dialect.quote(&spec.name);
                    format!("{column} = excluded.{column}")
                })
                .collect::<Vec<_>>();
            if assignments.is_empty() {
                format!("{insert} ON CONFLICT({key}) DO NOTHING")
            } else {
                format!("{insert} ON CONFLICT({key}) DO UPDATE SET {}", assignments.join(", "))
            }
        }
        SqlDialect::Mysql => {
            let mut assignments = schema
                .fields
                .iter()
                .map(|spec| {
                    let column = dialect.quote(&spec.name);
                    format!("{column} = VALUES({column})")
                })
                .collect::<Vec<_>>();
            if assignments.is_empty() {
                assignments.push(format!("{key} = {key}"));
            }
            format!("{insert} ON DUPLICATE KEY UPDATE {}", assignments.join(", "))
        }
    }
}

/// Builds a select by storage id.
#[must_use]
pub fn select_by_key(dialect: SqlDialect, schema: &RecordSchema) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = ?",
        column_list(dialect, schema),
        dialect.quote(&schema.collection),
        dialect.quote(KEY_FIELD)
    )
}

/// Builds a delete by storage id.
#[must_use]
pub fn delete_by_key(dialect: SqlDialect, schema: &RecordSchema) -> String {
    format!("DELETE FROM {} WHERE {} = ?", dialect.quote(&schema.collection), dialect.quote(KEY_FIELD))
}

/// Builds one keyset page of matching rows ordered by storage id.
#[must_use]
pub fn select_page(
    dialect: SqlDialect,
    schema: &RecordSchema,
    filter: &Filter,
    after: Option<&str>,
    limit: usize,
) -> (String, Vec<SqlValue>) {
    let (clause, params) = where_clause(dialect, filter, after);
    let sql = format!(
        "SELECT {} FROM {}{clause} ORDER BY {} LIMIT {limit}",
        column_list(dialect, schema),
        dialect.quote(&schema.collection),
        dialect.quote(KEY_FIELD)
    );
    (sql, params)
}

/// Builds a count of matching rows.
#[must_use]
pub fn count(dialect: SqlDialect, schema: &RecordSchema, filter: &Filter) -> (String, Vec<SqlValue>) {
    let (clause, params) = where_clause(dialect, filter, None);
    (format!("SELECT COUNT(*) FROM {}{clause}", dialect.quote(&schema.collection)), params)
}

/// Builds a conjunctive `WHERE` clause with an optional keyset cursor.
#[must_use]
pub fn where_clause(dialect: SqlDialect, filter: &Filter, after: Option<&str>) -> (String, Vec<SqlValue>) {
    let mut conditions = Vec::new();
    let mut params = Vec::new();
    for predicate in filter.predicates() {
        conditions.push(format!("{} {} ?", dialect.quote(&predicate.field), predicate.op.sql_token()));
        params.push(operand(&predicate.value));
    }
    if let Some(after) = after {
        conditions.push(format!("{} > ?", dialect.quote(KEY_FIELD)));
        params.push(SqlValue::Text(after.to_string()));
    }
    if conditions.is_empty() {
        return (String::new(), params);
    }
    (format!(" WHERE {}", conditions.join(" AND ")), params)
}

/// Converts a scalar filter operand into its column representation.
fn operand(value: &FieldValue) -> SqlValue {
    match value {
        FieldValue::String(text) => SqlValue::Text(text.clone()),
        FieldValue::Integer(number) => SqlValue::Integer(*number),
        FieldValue::Float(number) => SqlValue::Real(*number),
        FieldValue::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        FieldValue::Timestamp(ts) => SqlValue::Integer(ts.as_unix_millis()),
        // Maps cannot be indexed, so validated filters never carry one.
        FieldValue::Map(_) => SqlValue::Null,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
