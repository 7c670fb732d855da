// crates/nextforge-store-relational/src/dialect.rs
// ============================================================================
// Module: Nextforge SQL Dialects
// Description: Identifier quoting and column typing per SQL engine.
// Purpose: Keep engine-specific SQL text in one place.
// Dependencies: nextforge-core
// ============================================================================

//! ## Overview
//! [`SqlDialect`] covers the differences between the supported engines that
//! matter for statement text. Both engines compare text columns by bytes
//! (`BINARY` in `SQLite`, `utf8mb4_bin` in `MySQL`), which keeps ordering and
//! range filters identical to the in-process filter semantics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use nextforge_core::FieldType;

// ============================================================================
// SECTION: Dialects
// ============================================================================

/// SQL engine dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    /// Embedded `SQLite`.
    Sqlite,
    /// `MySQL` / `MariaDB`.
    Mysql,
}

impl SqlDialect {
    /// Returns the stable dialect label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
        }
    }

    /// Quotes an identifier.
    #[must_use]
    pub fn quote(self, ident: &str) -> String {
        match self {
            Self::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::Mysql => format!("`{}`", ident.replace('`', "``")),
        }
    }

    /// Returns the column type for the storage id.
    #[must_use]
    pub const fn key_column_type(self) -> &'static str {
        match self {
            Self::Sqlite => "TEXT",
            Self::Mysql => "VARCHAR(255) COLLATE utf8mb4_bin",
        }
    }

    /// Returns the column type for a field.
    ///
    /// Indexed strings need a bounded type in `MySQL`.
    #[must_use]
    pub const fn column_type(self, field_type: FieldType, indexed: bool) -> &'static str {
        match (self, field_type) {
            (Self::Sqlite, FieldType::String | FieldType::Map) => "TEXT",
            (Self::Sqlite, FieldType::Integer | FieldType::Bool | FieldType::Timestamp) => "INTEGER",
            (Self::Sqlite, FieldType::Float) => "REAL",
            (Self::Mysql, FieldType::String) if indexed => "VARCHAR(255) COLLATE utf8mb4_bin",
            (Self::Mysql, FieldType::String) => "TEXT COLLATE utf8mb4_bin",
            (Self::Mysql, FieldType::Map) => "LONGTEXT",
            (Self::Mysql, FieldType::Integer | FieldType::Timestamp) => "BIGINT",
            (Self::Mysql, FieldType::Bool) => "TINYINT(1)",
            (Self::Mysql, FieldType::Float) => "DOUBLE",
        }
    }

    /// Returns trailing `CREATE TABLE` options.
    #[must_use]
    pub const fn table_options(self) -> &'static str {
        match self {
            Self::Sqlite => "",
            Self::Mysql => " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin",
        }
    }

    /// Returns the physical index name.
    ///
    /// `SQLite` index names are database-wide, so they carry the table name.
    #[must_use]
    pub fn index_name(self, collection: &str, index: &str) -> String {
        match self {
            Self::Sqlite => format!("{collection}_{index}"),
            Self::Mysql => index.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Column Classes
// ============================================================================

/// Storage class of a column, independent of the engine's type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnClass {
    /// Character data.
    Text,
    /// Integer data.
    Integer,
    /// Floating-point data.
    Real,
}

impl ColumnClass {
    /// Returns the class a field type is stored as.
    #[must_use]
    pub const fn for_field(field_type: FieldType) -> Self {
        match field_type {
            FieldType::String | FieldType::Map => Self::Text,
            FieldType::Integer | FieldType::Bool | FieldType::Timestamp => Self::Integer,
            FieldType::Float => Self::Real,
        }
    }

    /// Classifies a declared column type reported by the engine catalog.
    #[must_use]
    pub fn classify(declared: &str) -> Option<Self> {
        let declared = declared.to_ascii_lowercase();
        if declared.contains("int") {
            Some(Self::Integer)
        } else if declared.contains("char") || declared.contains("text") || declared.contains("clob") {
            Some(Self::Text)
        } else if declared.contains("real")
            || declared.contains("floa")
            || declared.contains("doub")
            || declared.contains("decimal")
        {
            Some(Self::Real)
        } else {
            None
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
