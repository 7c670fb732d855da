// crates/nextforge-store-relational/src/mysql.rs
// ============================================================================
// Module: Nextforge MySQL Driver
// Description: Pooled MySQL engine behind the `mysql` backend.
// Purpose: Provide a networked relational engine.
// Dependencies: mysql
// ============================================================================

//! ## Overview
//! [`MysqlDriver`] owns a bounded connection pool. Each operation checks a
//! connection out for its duration, so concurrent callers never share one
//! connection. Batches run in one transaction on one checked-out
//! connection. Server error codes 1044, 1045, and 1698 are authentication
//! failures; transport and driver errors mean the server is unreachable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use mysql::OptsBuilder;
use mysql::Params;
use mysql::Pool;
use mysql::PoolConstraints;
use mysql::PoolOpts;
use mysql::PooledConn;
use mysql::Row;
use mysql::TxOpts;
use mysql::Value;
use mysql::prelude::Queryable;
use nextforge_core::SqlValue;

use crate::dialect::SqlDialect;
use crate::driver::BatchStatement;
use crate::driver::ColumnInfo;
use crate::driver::DriverError;
use crate::driver::SqlDriver;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Server error codes that mean the credentials were rejected.
const AUTH_ERROR_CODES: [u16; 3] = [1044, 1045, 1698];

/// Connection options for a `MySQL` server.
#[derive(Clone, PartialEq, Eq)]
pub struct MysqlOptions {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// User name.
    pub user: String,
    /// Password (never logged).
    pub password: Option<String>,
    /// Database name.
    pub database: String,
    /// Maximum pooled connections.
    pub pool_max: usize,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl fmt::Debug for MysqlOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MysqlOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("pool_max", &self.pool_max)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// `MySQL` driver over a bounded pool.
pub struct MysqlDriver {
    /// Pool; `None` once closed.
    pool: Mutex<Option<Pool>>,
}

impl MysqlDriver {
    /// Connects to the server and verifies the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Auth`] for rejected credentials and
    /// [`DriverError::Unreachable`] when the server cannot be reached.
    pub fn open(options: &MysqlOptions) -> Result<Self, DriverError> {
        let constraints = PoolConstraints::new(1, options.pool_max.max(1))
            .ok_or_else(|| DriverError::Unreachable("invalid pool bounds".to_string()))?;
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(options.host.clone()))
            .tcp_port(options.port)
            .user(Some(options.user.clone()))
            .pass(options.password.clone())
            .db_name(Some(options.database.clone()))
            .tcp_connect_timeout(Some(options.connect_timeout))
            .pool_opts(PoolOpts::default().with_constraints(constraints));
        let pool = Pool::new(opts).map_err(map_error)?;
        let driver = Self {
            pool: Mutex::new(Some(pool)),
        };
        driver.ping()?;
        Ok(driver)
    }

    /// Checks a connection out of the pool.
    fn conn(&self) -> Result<PooledConn, DriverError> {
        let pool = {
            let guard = self
                .pool
                .lock()
                .map_err(|_| DriverError::Statement("mysql pool mutex poisoned".to_string()))?;
            guard.clone().ok_or(DriverError::Closed)?
        };
        pool.get_conn().map_err(map_error)
    }
}

impl SqlDriver for MysqlDriver {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Mysql
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        let mut conn = self.conn()?;
        conn.exec_drop(sql, to_params(params)).map_err(map_error)?;
        Ok(conn.affected_rows())
    }

    fn execute_batch(&self, statements: &[BatchStatement]) -> Result<(), DriverError> {
        let mut conn = self.conn()?;
        // Dropping the transaction without commit rolls it back.
        let mut tx = conn.start_transaction(TxOpts::default()).map_err(map_error)?;
        for (index, statement) in statements.iter().enumerate() {
            tx.exec_drop(&statement.sql, to_params(&statement.params)).map_err(map_error)?;
            if statement.expect_change && tx.affected_rows() == 0 {
                return Err(DriverError::Unchanged(index));
            }
        }
        tx.commit().map_err(map_error)
    }

    fn query(&self, sql: &str, params: &[SqlValue], column_count: usize) -> Result<Vec<Vec<SqlValue>>, DriverError> {
        let mut conn = self.conn()?;
        let rows: Vec<Row> = conn.exec(sql, to_params(params)).map_err(map_error)?;
        rows.iter()
            .map(|row| {
                (0..column_count)
                    .map(|index| row.as_ref(index).map_or(Ok(SqlValue::Null), from_value))
                    .collect()
            })
            .collect()
    }

    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DriverError> {
        let mut conn = self.conn()?;
        let rows: Vec<(String, String)> = conn
            .exec(
                "SELECT COLUMN_NAME, DATA_TYPE FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = \
                 DATABASE() AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
                (table,),
            )
            .map_err(map_error)?;
        Ok(rows
            .into_iter()
            .map(|(name, declared_type)| ColumnInfo {
                name,
                declared_type,
            })
            .collect())
    }

    fn index_names(&self, table: &str) -> Result<BTreeSet<String>, DriverError> {
        let mut conn = self.conn()?;
        let names: Vec<String> = conn
            .exec(
                "SELECT DISTINCT INDEX_NAME FROM information_schema.STATISTICS WHERE TABLE_SCHEMA = \
                 DATABASE() AND TABLE_NAME = ?",
                (table,),
            )
            .map_err(map_error)?;
        Ok(names.into_iter().collect())
    }

    fn ping(&self) -> Result<(), DriverError> {
        self.conn()?.query_drop("SELECT 1").map_err(map_error)
    }

    fn close(&self) {
        if let Ok(mut guard) = self.pool.lock() {
            guard.take();
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a client error onto a driver error category.
fn map_error(err: mysql::Error) -> DriverError {
    match &err {
        mysql::Error::MySqlError(server) if AUTH_ERROR_CODES.contains(&server.code) => {
            DriverError::Auth(err.to_string())
        }
        mysql::Error::IoError(_) | mysql::Error::DriverError(_) | mysql::Error::UrlError(_) => {
            DriverError::Unreachable(err.to_string())
        }
        _ => DriverError::Statement(err.to_string()),
    }
}

/// Converts column values into positional parameters.
fn to_params(params: &[SqlValue]) -> Params {
    if params.is_empty() {
        return Params::Empty;
    }
    Params::Positional(
        params
            .iter()
            .map(|value| match value {
                SqlValue::Null => Value::NULL,
                SqlValue::Integer(number) => Value::Int(*number),
                SqlValue::Real(number) => Value::Double(*number),
                SqlValue::Text(text) => Value::Bytes(text.as_bytes().to_vec()),
            })
            .collect(),
    )
}

/// Converts a server value into a column value.
fn from_value(value: &Value) -> Result<SqlValue, DriverError> {
    match value {
        Value::NULL => Ok(SqlValue::Null),
        Value::Int(number) => Ok(SqlValue::Integer(*number)),
        Value::UInt(number) => i64::try_from(*number)
            .map(SqlValue::Integer)
            .map_err(|_| DriverError::Statement("unsigned value out of range".to_string())),
        Value::Float(number) => Ok(SqlValue::Real(f64::from(*number))),
        Value::Double(number) => Ok(SqlValue::Real(*number)),
        Value::Bytes(bytes) => String::from_utf8(bytes.clone())
            .map(SqlValue::Text)
            .map_err(|_| DriverError::Statement("column is not valid utf-8".to_string())),
        Value::Date(..) | Value::Time(..) => {
            Err(DriverError::Statement("temporal columns are not supported".to_string()))
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_convert_to_positional_params() {
        let params = to_params(&[SqlValue::Integer(1), SqlValue::Text("a".to_string()), SqlValue::Null]);
        assert_eq!(
            params,
            Params::Positional(vec![Value::Int(1), Value::Bytes(b"a".to_vec()), Value::NULL])
        );
        assert_eq!(to_params(&[]), Params::Empty);
    }

    #[test]
    fn server_values_convert_to_columns() {
        assert_eq!(from_value(&Value::UInt(7)), Ok(SqlValue::Integer(7)));
        assert_eq!(from_value(&Value::Bytes(b"x".to_vec())), Ok(SqlValue::Text("x".to_string())));
        assert!(from_value(&Value::UInt(u64::MAX)).is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let options = MysqlOptions {
            host: "db".to_string(),
            port: 3306,
            user: "app".to_string(),
            password: Some("hunter2".to_string()),
            database: "game".to_string(),
            pool_max: 4,
            connect_timeout: Duration::from_secs(5),
        };
        assert!(!format!("{options:?}").contains("hunter2"));
    }
}
