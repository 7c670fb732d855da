// crates/nextforge-store-document/src/driver.rs
// ============================================================================
// Module: Nextforge Document Drivers
// Description: Engine abstraction for document stores.
// Purpose: Isolate engine-specific query and index handling from the store.
// Dependencies: nextforge-core, thiserror
// ============================================================================

//! ## Overview
//! A [`DocumentDriver`] stores [`Document`]s per collection and evaluates
//! [`Filter`]s in its own query language. Drivers receive the collection
//! schema on every call so they can manage indexes and decode documents for
//! in-process filtering.

// ============================================================================
// SECTION: Imports
// ============================================================================

use nextforge_core::ConnectionError;
use nextforge_core::Document;
use nextforge_core::Filter;
use nextforge_core::RecordSchema;
use nextforge_core::StoreError;
use thiserror::Error;

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
    #[error("document store unreachable: {0}")]
    Unreachable(String),
    /// Stored collection does not match the schema.
    #[error("collection mismatch: {0}")]
    Mismatch(String),
    /// Operation failed.
    #[error("operation failed: {0}")]
    Operation(String),
    /// A batch removal targeted an absent document.
    #[error("batch write {0} targets a missing document")]
    Missing(usize),
    /// Driver was closed.
    #[error("driver is closed")]
    Closed,
}

impl DriverError {
    /// Maps a failure during connect or collection setup.
    #[must_use]
    pub fn into_connection(self) -> ConnectionError {
        match self {
            Self::Auth(message) => ConnectionError::auth_failure(message),
            Self::Unreachable(message) => ConnectionError::unreachable(message),
            Self::Mismatch(message) | Self::Operation(message) => ConnectionError::schema_mismatch(message),
            missing @ Self::Missing(_) => ConnectionError::schema_mismatch(missing.to_string()),
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

/// One write of a document batch.
#[derive(Debug, Clone)]
pub enum DocumentWrite {
    /// Inserts or fully replaces the document keyed by `id`.
    Replace {
        /// Storage id.
        id: String,
        /// Full document, including `_id`.
        document: Document,
    },
    /// Removes the document keyed by `id`; the batch fails when it is absent.
    Remove {
        /// Storage id.
        id: String,
    },
}

/// Document engine driver.
pub trait DocumentDriver: Send + Sync {
    /// Returns the engine label used in logs.
    fn engine(&self) -> &'static str;

    /// Prepares a collection: checks stored metadata and reconciles indexes.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Mismatch`] when stored data belongs to another
    /// collection or cannot be read.
    fn ensure_collection(&self, schema: &RecordSchema) -> Result<(), DriverError>;

    /// Loads the document with storage id `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the engine fails.
    fn find_one(&self, schema: &RecordSchema, id: &str) -> Result<Option<Document>, DriverError>;

    /// Inserts or fully replaces the document keyed by its `_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Operation`] when a unique index is violated.
    fn replace(&self, schema: &RecordSchema, id: &str, document: Document) -> Result<(), DriverError>;

    /// Removes a document; returns false when none existed.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the engine fails.
    fn remove(&self, schema: &RecordSchema, id: &str) -> Result<bool, DriverError>;

    /// Applies `writes` in order.
    ///
    /// The provided implementation stops at the first failure and keeps the
    /// writes before it. Engines that can stage a batch override it so a
    /// failed batch writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Missing`] with the write index when a removal
    /// targets an absent document, or the failing write's [`DriverError`].
    fn apply_batch(&self, schema: &RecordSchema, writes: Vec<DocumentWrite>) -> Result<(), DriverError> {
        for (index, write) in writes.into_iter().enumerate() {
            match write {
                DocumentWrite::Replace {
                    id,
                    document,
                } => self.replace(schema, &id, document)?,
                DocumentWrite::Remove {
                    id,
                } => {
                    if !self.remove(schema, &id)? {
                        return Err(DriverError::Missing(index));
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns up to `limit` matching documents with `_id` greater than
    /// `after`, ordered by `_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the engine fails.
    fn find_page(
        &self,
        schema: &RecordSchema,
        filter: &Filter,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Document>, DriverError>;

    /// Counts matching documents.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the engine fails.
    fn count(&self, schema: &RecordSchema, filter: &Filter) -> Result<u64, DriverError>;

    /// Performs a minimal round trip.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the engine does not respond.
    fn ping(&self) -> Result<(), DriverError>;

    /// Releases engine resources.
    fn close(&self);
}
