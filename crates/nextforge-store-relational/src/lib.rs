// crates/nextforge-store-relational/src/lib.rs
// ============================================================================
// Module: Nextforge Relational Store
// Description: Row-form record stores over SQL drivers.
// Purpose: Implement the record store contract for relational backends.
// Dependencies: nextforge-core, rusqlite, mysql (feature)
// ============================================================================

//! ## Overview
//! [`RelationalStore`] implements [`nextforge_core::RecordStore`] once for
//! every SQL engine. Engines plug in through [`SqlDriver`], which only moves
//! [`nextforge_core::SqlValue`] rows in and out; statement text is built by
//! [`statement`] using the engine's [`SqlDialect`].
//!
//! Invariants:
//! - One table per collection, keyed by the `_key` storage id column.
//! - Tables are created or extended at connect time; incompatible existing
//!   tables fail with a schema-mismatch connection error.
//! - Fields not declared by the schema are dropped with a warning.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod dialect;
pub mod driver;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod sqlite;
pub mod statement;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dialect::ColumnClass;
pub use dialect::SqlDialect;
pub use driver::BatchStatement;
pub use driver::ColumnInfo;
pub use driver::DriverError;
pub use driver::SqlDriver;
#[cfg(feature = "mysql")]
pub use crate::mysql::MysqlDriver;
#[cfg(feature = "mysql")]
pub use crate::mysql::MysqlOptions;
pub use sqlite::SqliteDriver;
pub use sqlite::SqliteJournalMode;
pub use sqlite::SqliteOptions;
pub use sqlite::SqliteSyncMode;
pub use store::RelationalStore;
