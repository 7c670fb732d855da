// crates/nextforge-store-relational/src/sqlite.rs
// ============================================================================
// Module: Nextforge SQLite Driver
// Description: Embedded SQLite engine behind the `h2` backend.
// Purpose: Provide a file-backed or in-memory relational engine.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! [`SqliteDriver`] owns a single `SQLite` connection guarded by a mutex,
//! which serializes access from concurrent callers. The connection is opened
//! with durability pragmas (`journal_mode`, `synchronous`, busy timeout).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use nextforge_core::SqlValue;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::TransactionBehavior;
use rusqlite::params_from_iter;
use rusqlite::types::Value;

use crate::dialect::SqlDialect;
use crate::driver::BatchStatement;
use crate::driver::ColumnInfo;
use crate::driver::DriverError;
use crate::driver::SqlDriver;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Default busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// `SQLite` journal mode.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteJournalMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }

    /// Parses a pragma value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "wal" => Some(Self::Wal),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// `SQLite` synchronous mode.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }

    /// Parses a pragma value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "full" => Some(Self::Full),
            "normal" => Some(Self::Normal),
            _ => None,
        }
    }
}

/// Options for the embedded engine.
///
/// # Invariants
/// - `path` is required unless `in_memory` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    /// Database file path.
    pub path: Option<PathBuf>,
    /// Use a private in-memory database.
    pub in_memory: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Journal mode.
    pub journal_mode: SqliteJournalMode,
    /// Synchronous mode.
    pub sync_mode: SqliteSyncMode,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            path: None,
            in_memory: false,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl SqliteOptions {
    /// Options for a database file at `path`.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Options for an in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            in_memory: true,
            ..Self::default()
        }
    }
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// `SQLite` driver over one mutex-guarded connection.
#[derive(Debug)]
pub struct SqliteDriver {
    /// Connection; `None` once closed.
    connection: Mutex<Option<Connection>>,
}

impl SqliteDriver {
    /// Opens the database described by `options`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Unreachable`] when the database cannot be
    /// opened or configured.
    pub fn open(options: &SqliteOptions) -> Result<Self, DriverError> {
        let connection = if options.in_memory {
            Connection::open_in_memory().map_err(|err| DriverError::Unreachable(err.to_string()))?
        } else {
            let path = options
                .path
                .as_deref()
                .ok_or_else(|| DriverError::Unreachable("database path is not set".to_string()))?;
            open_file(path)?
        };
        apply_pragmas(&connection, options)?;
        Ok(Self {
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Locks the connection slot.
    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, DriverError> {
        self.connection
            .lock()
            .map_err(|_| DriverError::Statement("sqlite connection mutex poisoned".to_string()))
    }

    /// Runs `f` with the open connection.
    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, DriverError> {
        let guard = self.lock()?;
        let connection = guard.as_ref().ok_or(DriverError::Closed)?;
        f(connection).map_err(statement_error)
    }
}

impl SqlDriver for SqliteDriver {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        let changed = self.with_connection(|conn| conn.execute(sql, params_from_iter(params.iter().map(to_value))))?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    fn execute_batch(&self, statements: &[BatchStatement]) -> Result<(), DriverError> {
        let mut guard = self.lock()?;
        let connection = guard.as_mut().ok_or(DriverError::Closed)?;
        // Dropping the transaction without commit rolls it back.
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate).map_err(statement_error)?;
        for (index, statement) in statements.iter().enumerate() {
            let changed = tx
                .execute(&statement.sql, params_from_iter(statement.params.iter().map(to_value)))
                .map_err(statement_error)?;
            if statement.expect_change && changed == 0 {
                return Err(DriverError::Unchanged(index));
            }
        }
        tx.commit().map_err(statement_error)
    }

    fn query(&self, sql: &str, params: &[SqlValue], column_count: usize) -> Result<Vec<Vec<SqlValue>>, DriverError> {
        let raw = self.with_connection(|conn| {
            let mut statement = conn.prepare(sql)?;
            let mut rows = statement.query(params_from_iter(params.iter().map(to_value)))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(column_count);
                for index in 0..column_count {
                    values.push(Value::from(row.get_ref(index)?));
                }
                out.push(values);
            }
            Ok(out)
        })?;
        raw.into_iter().map(|row| row.into_iter().map(from_value).collect()).collect()
    }

    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DriverError> {
        let sql = format!("PRAGMA table_info({})", SqlDialect::Sqlite.quote(table));
        self.with_connection(|conn| {
            let mut statement = conn.prepare(&sql)?;
            let rows = statement.query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                })
            })?;
            rows.collect()
        })
    }

    fn index_names(&self, table: &str) -> Result<BTreeSet<String>, DriverError> {
        self.with_connection(|conn| {
            let mut statement =
                conn.prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1")?;
            let rows = statement.query_map([table], |row| row.get::<_, String>(0))?;
            rows.collect()
        })
    }

    fn ping(&self) -> Result<(), DriverError> {
        self.with_connection(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .map(|_| ())
    }

    fn close(&self) {
        if let Ok(mut guard) = self.connection.lock() {
            guard.take();
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens a database file, creating parent directories.
fn open_file(path: &Path) -> Result<Connection, DriverError> {
    if path.is_dir() {
        return Err(DriverError::Unreachable(format!("{} is a directory", path.display())));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|err| DriverError::Unreachable(err.to_string()))?;
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    Connection::open_with_flags(path, flags).map_err(|err| DriverError::Unreachable(err.to_string()))
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, options: &SqliteOptions) -> Result<(), DriverError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", options.journal_mode.pragma_value()))
        .map_err(|err| DriverError::Unreachable(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", options.sync_mode.pragma_value()))
        .map_err(|err| DriverError::Unreachable(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(options.busy_timeout_ms))
        .map_err(|err| DriverError::Unreachable(err.to_string()))?;
    Ok(())
}

/// Maps a statement failure.
fn statement_error(err: rusqlite::Error) -> DriverError {
    DriverError::Statement(err.to_string())
}

/// Converts a column value into a `SQLite` parameter.
fn to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(number) => Value::Integer(*number),
        SqlValue::Real(number) => Value::Real(*number),
        SqlValue::Text(text) => Value::Text(text.clone()),
    }
}

/// Converts a `SQLite` value into a column value.
fn from_value(value: Value) -> Result<SqlValue, DriverError> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Integer(number) => Ok(SqlValue::Integer(number)),
        Value::Real(number) => Ok(SqlValue::Real(number)),
        Value::Text(text) => Ok(SqlValue::Text(text)),
        Value::Blob(_) => Err(DriverError::Statement("unexpected blob column".to_string())),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
