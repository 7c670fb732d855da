// crates/nextforge-store-relational/src/driver.rs
// ============================================================================
// Module: Nextforge SQL Driver Interface
// Description: Minimal statement execution surface per SQL engine.
// Purpose: Decouple relational store logic from engine client crates.
// Dependencies: nextforge-core, thiserror
// ============================================================================

//! ## Overview
//! A [`SqlDriver`] executes parameterized statements and reports catalog
//! metadata. Parameters and results use [`SqlValue`], so the store never
//! touches an engine client type.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use nextforge_core::ConnectionError;
use nextforge_core::SqlValue;
use nextforge_core::StoreError;
use thiserror::Error;

use crate::dialect::SqlDialect;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Driver failure categories.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Credentials were rejected.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Engine could not be reached or opened.
    #[error("database unreachable: {0}")]
    Unreachable(String),
    /// Statement failed.
    #[error("statement failed: {0}")]
    Statement(String),
    /// A batch statement that must change a row changed none.
    #[error("batch statement {0} changed no rows")]
    Unchanged(usize),
    /// Driver was closed.
    #[error("driver is closed")]
    Closed,
}

impl DriverError {
    /// Maps a failure during connect or schema setup.
    #[must_use]
    pub fn into_connection(self) -> ConnectionError {
        match self {
            Self::Auth(message) => ConnectionError::auth_failure(message),
            Self::Unreachable(message) => ConnectionError::unreachable(message),
            Self::Statement(message) => ConnectionError::schema_mismatch(message),
            unchanged @ Self::Unchanged(_) => ConnectionError::schema_mismatch(unchanged.to_string()),
            Self::Closed => ConnectionError::unreachable("driver is closed"),
        }
    }
}

impl From<DriverError> for StoreError {
    fn from(error: DriverError) -> Self {
        match error {
            DriverError::Closed => Self::Closed,
            other => Self::Backend(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Driver Trait
// ============================================================================

/// Column metadata from the engine catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type as reported by the engine.
    pub declared_type: String,
}

/// One statement of a transactional batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatement {
    /// Statement text with positional placeholders.
    pub sql: String,
    /// Positional parameters.
    pub params: Vec<SqlValue>,
    /// Fail the batch when the statement changes no rows.
    pub expect_change: bool,
}

/// SQL engine driver.
///
/// # Invariants
/// - Implementations are safe to call from multiple threads.
/// - Every method fails with [`DriverError::Closed`] after [`SqlDriver::close`].
pub trait SqlDriver: Send + Sync {
    /// Returns the engine dialect.
    fn dialect(&self) -> SqlDialect;

    /// Executes a statement and returns the affected row count.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when execution fails.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError>;

    /// Executes `statements` in order inside one transaction.
    ///
    /// The transaction commits only when every statement succeeds; on the
    /// first failure it is rolled back and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Unchanged`] with the statement index when a
    /// statement with `expect_change` changes no rows, or the failing
    /// statement's [`DriverError`].
    fn execute_batch(&self, statements: &[BatchStatement]) -> Result<(), DriverError>;

    /// Runs a query returning `column_count` columns per row.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the query fails or a value has no
    /// [`SqlValue`] representation.
    fn query(&self, sql: &str, params: &[SqlValue], column_count: usize) -> Result<Vec<Vec<SqlValue>>, DriverError>;

    /// Returns the columns of `table`; empty when the table does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the catalog cannot be read.
    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DriverError>;

    /// Returns the index names defined on `table`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the catalog cannot be read.
    fn index_names(&self, table: &str) -> Result<BTreeSet<String>, DriverError>;

    /// Performs a round trip to the engine.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the engine does not answer.
    fn ping(&self) -> Result<(), DriverError>;

    /// Releases connections. Idempotent.
    fn close(&self);
}
