// crates/nextforge-core/src/interfaces/mod.rs
// ============================================================================
// Module: Nextforge Store Interfaces
// Description: Backend-agnostic record store contract and error taxonomy.
// Purpose: Define the single CRUD surface every backend family implements.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! [`RecordStore`] is the capability set shared by relational and document
//! backends. Implementations translate records through the serialization
//! layer and never expose native shapes to callers.
//!
//! Invariants:
//! - `put` is a full replacement upsert; no partial-field merge.
//! - `list_page` returns records ordered by canonical storage id, strictly
//!   after the `after` cursor, so [`RecordCursor`] is lazy and restartable.
//! - Record-operation errors are returned to the caller and never terminate
//!   the process.
//! - Implementations are safe to share across threads; shared connection
//!   state is serialized or pooled internally.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

use crate::core::filter::Filter;
use crate::core::filter::FilterError;
use crate::core::record::Record;
use crate::core::record::RecordKey;
use crate::core::schema::SchemaError;
use crate::core::serialization::BackendKind;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default page size used by [`RecordCursor`].
pub const DEFAULT_PAGE_SIZE: usize = 256;

// ============================================================================
// SECTION: Connection Errors
// ============================================================================

/// Connection failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionErrorKind {
    /// Credentials were rejected.
    AuthFailure,
    /// Store could not be reached.
    Unreachable,
    /// Existing native schema is incompatible with the declared schema.
    SchemaMismatch,
}

impl ConnectionErrorKind {
    /// Returns the stable label for the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthFailure => "auth_failure",
            Self::Unreachable => "unreachable",
            Self::SchemaMismatch => "schema_mismatch",
        }
    }

    /// Returns true when the category is transient and may be retried.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Unreachable)
    }
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised while connecting a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connection failed ({kind}): {message}")]
pub struct ConnectionError {
    /// Failure category.
    kind: ConnectionErrorKind,
    /// Diagnostic message.
    message: String,
}

impl ConnectionError {
    /// Builds a connection error.
    #[must_use]
    pub fn new(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Builds an authentication failure.
    #[must_use]
    pub fn auth_failure(message: impl Into<String>) -> Self {
        Self::new(ConnectionErrorKind::AuthFailure, message)
    }

    /// Builds an unreachable failure.
    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ConnectionErrorKind::Unreachable, message)
    }

    /// Builds a schema mismatch failure.
    #[must_use]
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::new(ConnectionErrorKind::SchemaMismatch, message)
    }

    /// Returns the failure category.
    #[must_use]
    pub const fn kind(&self) -> ConnectionErrorKind {
        self.kind
    }

    /// Returns the diagnostic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Record operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No record exists for the key.
    #[error("record {key} not found in {collection}")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Canonical storage id.
        key: String,
    },
    /// Collection was not declared at connect time.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    /// Record does not fit the schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Filter does not fit the schema.
    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),
    /// Backend reported a failure.
    #[error("store backend error: {0}")]
    Backend(String),
    /// Store was disconnected.
    #[error("store is disconnected")]
    Closed,
}

impl StoreError {
    /// Builds a not-found error for a key.
    #[must_use]
    pub fn not_found(collection: &str, key: &RecordKey) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            key: key.storage_id(),
        }
    }
}

// ============================================================================
// SECTION: Health
// ============================================================================

/// Liveness report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Store responded within the latency budget.
    Ok,
    /// Store responded slowly.
    Degraded {
        /// Observed round-trip latency in milliseconds.
        latency_ms: u64,
    },
    /// Store did not respond.
    Down {
        /// Failure description.
        reason: String,
    },
}

// ============================================================================
// SECTION: Record Store
// ============================================================================

/// Backend-agnostic record store.
pub trait RecordStore: Send + Sync {
    /// Returns the backend family.
    fn kind(&self) -> BackendKind;

    /// Loads a record by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists.
    fn get(&self, collection: &str, key: &RecordKey) -> Result<Record, StoreError>;

    /// Creates or fully replaces a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record does not fit the schema or the
    /// backend fails.
    fn put(&self, collection: &str, record: &Record) -> Result<(), StoreError>;

    /// Deletes a record by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists.
    fn delete(&self, collection: &str, key: &RecordKey) -> Result<(), StoreError>;

    /// Upserts every record in order.
    ///
    /// The provided implementation stops at the first failure and keeps the
    /// records written before it. Backends with transactions override it so
    /// a failed batch writes nothing.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] raised by [`RecordStore::put`].
    fn put_all(&self, collection: &str, records: &[Record]) -> Result<(), StoreError> {
        for record in records {
            self.put(collection, record)?;
        }
        Ok(())
    }

    /// Deletes every key in order.
    ///
    /// Partial application on failure follows [`RecordStore::put_all`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for the first missing key, or the
    /// first other [`StoreError`] raised by [`RecordStore::delete`].
    fn delete_all(&self, collection: &str, keys: &[RecordKey]) -> Result<(), StoreError> {
        for key in keys {
            self.delete(collection, key)?;
        }
        Ok(())
    }

    /// Returns up to `limit` matching records with storage id greater than
    /// `after`, ordered by storage id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidFilter`] when the filter does not fit the
    /// schema, or other [`StoreError`]s on backend failure.
    fn list_page(
        &self,
        collection: &str,
        filter: &Filter,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Record>, StoreError>;

    /// Counts matching records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the filter is invalid or the backend fails.
    fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Returns true when a record exists for the key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn exists(&self, collection: &str, key: &RecordKey) -> Result<bool, StoreError> {
        match self.get(collection, key) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Performs a minimal round trip to the backend.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend does not respond.
    fn ping(&self) -> Result<(), StoreError>;

    /// Reports liveness, degraded when the ping exceeds `degraded_after`.
    fn health_check(&self, degraded_after: Duration) -> HealthStatus {
        let started = Instant::now();
        match self.ping() {
            Ok(()) => {
                let elapsed = started.elapsed();
                if elapsed > degraded_after {
                    HealthStatus::Degraded {
                        latency_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    }
                } else {
                    HealthStatus::Ok
                }
            }
            Err(err) => HealthStatus::Down {
                reason: err.to_string(),
            },
        }
    }

    /// Releases connections; later operations fail with
    /// [`StoreError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when releasing resources fails.
    fn disconnect(&self) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Record Cursor
// ============================================================================

/// Lazy, finite sequence of records matching a filter.
///
/// Each cursor starts from the beginning; re-creating it with the same filter
/// restarts the sequence. Iteration stops after the first error.
pub struct RecordCursor<'a> {
    /// Store being paged.
    store: &'a dyn RecordStore,
    /// Collection name.
    collection: String,
    /// Filter applied to each page.
    filter: Filter,
    /// Storage id of the last record yielded.
    after: Option<String>,
    /// Records fetched but not yet yielded.
    buffer: VecDeque<Record>,
    /// Page size.
    page_size: usize,
    /// Set once the backend returned a short page or an error.
    done: bool,
}

impl<'a> RecordCursor<'a> {
    /// Creates a cursor with the default page size.
    #[must_use]
    pub fn new(store: &'a dyn RecordStore, collection: &str, filter: Filter) -> Self {
        Self::with_page_size(store, collection, filter, DEFAULT_PAGE_SIZE)
    }

    /// Creates a cursor with a custom page size (at least one).
    #[must_use]
    pub fn with_page_size(
        store: &'a dyn RecordStore,
        collection: &str,
        filter: Filter,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            filter,
            after: None,
            buffer: VecDeque::new(),
            page_size: page_size.max(1),
            done: false,
        }
    }
}

impl Iterator for RecordCursor<'_> {
    type Item = Result<Record, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            match self.store.list_page(
                &self.collection,
                &self.filter,
                self.after.as_deref(),
                self.page_size,
            ) {
                Ok(page) => {
                    if page.len() < self.page_size {
                        self.done = true;
                    }
                    self.buffer.extend(page);
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        let record = self.buffer.pop_front()?;
        self.after = Some(record.key.storage_id());
        Some(Ok(record))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
