// crates/nextforge-store-relational/src/store.rs
// ============================================================================
// Module: Nextforge Relational Store
// Description: Row-form record store over any SQL driver.
// Purpose: Implement the record store contract for relational backends.
// Dependencies: nextforge-core, tracing
// ============================================================================

//! ## Overview
//! [`RelationalStore`] maps each declared collection onto one table with a
//! `_key` primary key column followed by one column per declared field.
//! Connecting reconciles the table with the schema:
//! - Absent tables are created; absent indexes are created after a catalog
//!   check.
//! - Missing optional columns are added; missing required columns and
//!   columns with an incompatible type class fail with `SchemaMismatch`.
//! - Columns the schema does not declare are ignored with a warning. Reads
//!   select declared columns only, and extra record fields are dropped on
//!   write.
//!
//! Batch writes run in one driver transaction: a failed batch writes
//! nothing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use nextforge_core::BackendKind;
use nextforge_core::ConnectionError;
use nextforge_core::Filter;
use nextforge_core::KEY_FIELD;
use nextforge_core::Record;
use nextforge_core::RecordKey;
use nextforge_core::RecordSchema;
use nextforge_core::RecordStore;
use nextforge_core::Row;
use nextforge_core::SqlValue;
use nextforge_core::StorageForm;
use nextforge_core::StoreError;
use nextforge_core::from_storage_form;
use nextforge_core::to_storage_form;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::dialect::ColumnClass;
use crate::dialect::SqlDialect;
use crate::driver::BatchStatement;
use crate::driver::ColumnInfo;
use crate::driver::DriverError;
use crate::driver::SqlDriver;
use crate::statement;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Relational record store.
///
/// # Invariants
/// - Every table named in `schemas` matched its schema when connected.
/// - Once `closed` is set every operation fails with [`StoreError::Closed`].
pub struct RelationalStore {
    /// Engine driver.
    driver: Box<dyn SqlDriver>,
    /// Declared schemas keyed by collection.
    schemas: BTreeMap<String, RecordSchema>,
    /// Set by [`RecordStore::disconnect`].
    closed: AtomicBool,
}

impl RelationalStore {
    /// Connects the store and reconciles every table with its schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] when the engine is unreachable, rejects
    /// the credentials, or holds tables incompatible with the schemas.
    pub fn connect(driver: Box<dyn SqlDriver>, schemas: &[RecordSchema]) -> Result<Self, ConnectionError> {
        driver.ping().map_err(DriverError::into_connection)?;
        let mut by_collection = BTreeMap::new();
        for schema in schemas {
            schema.validate().map_err(|err| {
                ConnectionError::schema_mismatch(format!("collection {}: {err}", schema.collection))
            })?;
            if by_collection.contains_key(&schema.collection) {
                return Err(ConnectionError::schema_mismatch(format!(
                    "collection {} declared twice",
                    schema.collection
                )));
            }
            ensure_table(driver.as_ref(), schema)?;
            ensure_indexes(driver.as_ref(), schema)?;
            by_collection.insert(schema.collection.clone(), schema.clone());
        }
        info!(
            dialect = driver.dialect().as_str(),
            collections = by_collection.len(),
            "relational store connected"
        );
        Ok(Self {
            driver,
            schemas: by_collection,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the engine dialect.
    #[must_use]
    pub fn dialect(&self) -> SqlDialect {
        self.driver.dialect()
    }

    /// Returns the schema for an open collection.
    fn schema(&self, collection: &str) -> Result<&RecordSchema, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        self.schemas.get(collection).ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))
    }

    /// Runs a row query and decodes every row into a record.
    fn query_records(
        &self,
        schema: &RecordSchema,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Record>, StoreError> {
        let names = statement::columns(schema);
        let rows = self.driver.query(sql, params, names.len())?;
        rows.into_iter().map(|values| decode_row(schema, &names, values)).collect()
    }
}

impl RecordStore for RelationalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn get(&self, collection: &str, key: &RecordKey) -> Result<Record, StoreError> {
        let schema = self.schema(collection)?;
        let sql = statement::select_by_key(self.dialect(), schema);
        self.query_records(schema, &sql, &[SqlValue::Text(key.storage_id())])?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found(collection, key))
    }

    fn put(&self, collection: &str, record: &Record) -> Result<(), StoreError> {
        let schema = self.schema(collection)?;
        let params = upsert_params(schema, record)?;
        self.driver.execute(&statement::upsert(self.dialect(), schema), &params)?;
        Ok(())
    }

    fn put_all(&self, collection: &str, records: &[Record]) -> Result<(), StoreError> {
        let schema = self.schema(collection)?;
        if records.is_empty() {
            return Ok(());
        }
        let sql = statement::upsert(self.dialect(), schema);
        let statements = records
            .iter()
            .map(|record| -> Result<BatchStatement, StoreError> {
                Ok(BatchStatement {
                    sql: sql.clone(),
                    params: upsert_params(schema, record)?,
                    expect_change: false,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.driver.execute_batch(&statements)?;
        debug!(collection, records = records.len(), "batch upsert committed");
        Ok(())
    }

    fn delete(&self, collection: &str, key: &RecordKey) -> Result<(), StoreError> {
        let schema = self.schema(collection)?;
        let affected = self
            .driver
            .execute(&statement::delete_by_key(self.dialect(), schema), &[SqlValue::Text(key.storage_id())])?;
        if affected == 0 {
            return Err(StoreError::not_found(collection, key));
        }
        Ok(())
    }

    fn delete_all(&self, collection: &str, keys: &[RecordKey]) -> Result<(), StoreError> {
        let schema = self.schema(collection)?;
        if keys.is_empty() {
            return Ok(());
        }
        let sql = statement::delete_by_key(self.dialect(), schema);
        let statements: Vec<BatchStatement> = keys
            .iter()
            .map(|key| BatchStatement {
                sql: sql.clone(),
                params: vec![SqlValue::Text(key.storage_id())],
                expect_change: true,
            })
            .collect();
        match self.driver.execute_batch(&statements) {
            Ok(()) => {
                debug!(collection, keys = keys.len(), "batch delete committed");
                Ok(())
            }
            Err(DriverError::Unchanged(index)) => match keys.get(index) {
                Some(key) => Err(StoreError::not_found(collection, key)),
                None => Err(StoreError::Backend(format!("batch statement {index} is out of range"))),
            },
            Err(err) => Err(err.into()),
        }
    }

    fn list_page(
        &self,
        collection: &str,
        filter: &Filter,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Record>, StoreError> {
        let schema = self.schema(collection)?;
        filter.validate(schema)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let (sql, params) = statement::select_page(self.dialect(), schema, filter, after, limit);
        self.query_records(schema, &sql, &params)
    }

    fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let schema = self.schema(collection)?;
        filter.validate(schema)?;
        let (sql, params) = statement::count(self.dialect(), schema, filter);
        let rows = self.driver.query(&sql, &params, 1)?;
        match rows.first().and_then(|row| row.first()) {
            Some(SqlValue::Integer(count)) => u64::try_from(*count)
                .map_err(|_| StoreError::Backend(format!("negative row count {count}"))),
            Some(other) => Err(StoreError::Backend(format!("count returned {}", other.type_label()))),
            None => Err(StoreError::Backend("count returned no rows".to_string())),
        }
    }

    fn ping(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        self.driver.ping().map_err(StoreError::from)
    }

    fn disconnect(&self) -> Result<(), StoreError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.driver.close();
            info!(dialect = self.dialect().as_str(), "relational store disconnected");
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Schema Reconciliation
// ============================================================================

/// Creates or reconciles the table for a schema.
fn ensure_table(driver: &dyn SqlDriver, schema: &RecordSchema) -> Result<(), ConnectionError> {
    let dialect = driver.dialect();
    let existing = driver.table_columns(&schema.collection).map_err(DriverError::into_connection)?;
    if existing.is_empty() {
        driver.execute(&statement::create_table(dialect, schema), &[]).map_err(DriverError::into_connection)?;
        info!(collection = %schema.collection, "created table");
        return Ok(());
    }
    let by_name: BTreeMap<&str, &ColumnInfo> =
        existing.iter().map(|column| (column.name.as_str(), column)).collect();
    match by_name.get(KEY_FIELD) {
        Some(column) if ColumnClass::classify(&column.declared_type) == Some(ColumnClass::Text) => {}
        Some(column) => {
            return Err(ConnectionError::schema_mismatch(format!(
                "table {} key column has type {}",
                schema.collection, column.declared_type
            )));
        }
        None => {
            return Err(ConnectionError::schema_mismatch(format!(
                "table {} has no {KEY_FIELD} column",
                schema.collection
            )));
        }
    }
    for spec in &schema.fields {
        match by_name.get(spec.name.as_str()) {
            Some(column) => {
                let expected = ColumnClass::for_field(spec.field_type);
                if ColumnClass::classify(&column.declared_type) != Some(expected) {
                    return Err(ConnectionError::schema_mismatch(format!(
                        "column {}.{} has type {}, incompatible with {}",
                        schema.collection, spec.name, column.declared_type, spec.field_type
                    )));
                }
            }
            None if spec.optional => {
                driver
                    .execute(&statement::add_column(dialect, schema, spec), &[])
                    .map_err(DriverError::into_connection)?;
                info!(collection = %schema.collection, column = %spec.name, "added optional column");
            }
            None => {
                return Err(ConnectionError::schema_mismatch(format!(
                    "table {} is missing required column {}",
                    schema.collection, spec.name
                )));
            }
        }
    }
    for column in &existing {
        if column.name != KEY_FIELD && schema.field_spec(&column.name).is_none() {
            warn!(
                collection = %schema.collection,
                column = %column.name,
                "ignoring column not declared by relational schema"
            );
        }
    }
    Ok(())
}

/// Creates declared indexes missing from the catalog.
fn ensure_indexes(driver: &dyn SqlDriver, schema: &RecordSchema) -> Result<(), ConnectionError> {
    let dialect = driver.dialect();
    let existing = driver.index_names(&schema.collection).map_err(DriverError::into_connection)?;
    for index in &schema.indexes {
        let name = dialect.index_name(&schema.collection, &index.name);
        if existing.contains(&name) {
            debug!(collection = %schema.collection, index = %name, "index present");
            continue;
        }
        driver
            .execute(&statement::create_index(dialect, schema, index), &[])
            .map_err(DriverError::into_connection)?;
        info!(collection = %schema.collection, index = %name, unique = index.unique, "created index");
    }
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serializes a record into upsert parameters in column order.
fn upsert_params(schema: &RecordSchema, record: &Record) -> Result<Vec<SqlValue>, StoreError> {
    let StorageForm::Row(mut row) = to_storage_form(record, schema, BackendKind::Relational)? else {
        return Err(StoreError::Backend("serializer produced a non-row form".to_string()));
    };
    Ok(statement::columns(schema)
        .into_iter()
        .map(|name| row.columns.remove(name).unwrap_or(SqlValue::Null))
        .collect())
}

/// Decodes positional column values into a record.
fn decode_row(schema: &RecordSchema, names: &[&str], values: Vec<SqlValue>) -> Result<Record, StoreError> {
    let row = Row {
        columns: names.iter().map(|name| (*name).to_string()).zip(values).collect(),
    };
    Ok(from_storage_form(&StorageForm::Row(row), schema, BackendKind::Relational)?)
}
