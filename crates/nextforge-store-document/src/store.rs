// crates/nextforge-store-document/src/store.rs
// ============================================================================
// Module: Nextforge Document Store
// Description: Document-form record store over any document driver.
// Purpose: Implement the record store contract for document backends.
// Dependencies: nextforge-core, tracing
// ============================================================================

//! ## Overview
//! [`DocumentStore`] maps each declared collection onto one engine
//! collection keyed by `_id`. Undeclared document fields round-trip through
//! `Record::extra`, so documents written by newer schemas survive reads and
//! rewrites by older ones.
//!
//! Batch writes are serialized up front and handed to the driver as one
//! [`DocumentWrite`] list; atomicity is whatever the driver provides.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use nextforge_core::BackendKind;
use nextforge_core::ConnectionError;
use nextforge_core::Document;
use nextforge_core::Filter;
use nextforge_core::Record;
use nextforge_core::RecordKey;
use nextforge_core::RecordSchema;
use nextforge_core::RecordStore;
use nextforge_core::StorageForm;
use nextforge_core::StoreError;
use nextforge_core::from_storage_form;
use nextforge_core::to_storage_form;
use tracing::debug;
use tracing::info;

use crate::driver::DocumentDriver;
use crate::driver::DocumentWrite;
use crate::driver::DriverError;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Document record store.
pub struct DocumentStore {
    /// Engine driver.
    driver: Box<dyn DocumentDriver>,
    /// Declared schemas keyed by collection.
    schemas: BTreeMap<String, RecordSchema>,
    /// Set by [`RecordStore::disconnect`].
    closed: AtomicBool,
}

impl DocumentStore {
    /// Connects the store and prepares every collection.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] when the engine is unreachable, rejects
    /// the credentials, or holds collections incompatible with the schemas.
    pub fn connect(driver: Box<dyn DocumentDriver>, schemas: &[RecordSchema]) -> Result<Self, ConnectionError> {
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
            driver.ensure_collection(schema).map_err(DriverError::into_connection)?;
            by_collection.insert(schema.collection.clone(), schema.clone());
        }
        info!(engine = driver.engine(), collections = by_collection.len(), "document store connected");
        Ok(Self {
            driver,
            schemas: by_collection,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the schema for an open collection.
    fn schema(&self, collection: &str) -> Result<&RecordSchema, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        self.schemas.get(collection).ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))
    }
}

impl RecordStore for DocumentStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    fn get(&self, collection: &str, key: &RecordKey) -> Result<Record, StoreError> {
        let schema = self.schema(collection)?;
        let document =
            self.driver.find_one(schema, &key.storage_id())?.ok_or_else(|| StoreError::not_found(collection, key))?;
        decode(schema, document)
    }

    fn put(&self, collection: &str, record: &Record) -> Result<(), StoreError> {
        let schema = self.schema(collection)?;
        self.driver.replace(schema, &record.key.storage_id(), encode(schema, record)?)?;
        Ok(())
    }

    fn put_all(&self, collection: &str, records: &[Record]) -> Result<(), StoreError> {
        let schema = self.schema(collection)?;
        if records.is_empty() {
            return Ok(());
        }
        let writes = records
            .iter()
            .map(|record| -> Result<DocumentWrite, StoreError> {
                Ok(DocumentWrite::Replace {
                    id: record.key.storage_id(),
                    document: encode(schema, record)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.driver.apply_batch(schema, writes)?;
        debug!(collection, records = records.len(), "batch upsert applied");
        Ok(())
    }

    fn delete(&self, collection: &str, key: &RecordKey) -> Result<(), StoreError> {
        let schema = self.schema(collection)?;
        if self.driver.remove(schema, &key.storage_id())? {
            Ok(())
        } else {
            Err(StoreError::not_found(collection, key))
        }
    }

    fn delete_all(&self, collection: &str, keys: &[RecordKey]) -> Result<(), StoreError> {
        let schema = self.schema(collection)?;
        if keys.is_empty() {
            return Ok(());
        }
        let writes = keys
            .iter()
            .map(|key| DocumentWrite::Remove {
                id: key.storage_id(),
            })
            .collect();
        match self.driver.apply_batch(schema, writes) {
            Ok(()) => {
                debug!(collection, keys = keys.len(), "batch delete applied");
                Ok(())
            }
            Err(DriverError::Missing(index)) => match keys.get(index) {
                Some(key) => Err(StoreError::not_found(collection, key)),
                None => Err(StoreError::Backend(format!("batch write {index} is out of range"))),
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
        self.driver
            .find_page(schema, filter, after, limit)?
            .into_iter()
            .map(|document| decode(schema, document))
            .collect()
    }

    fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let schema = self.schema(collection)?;
        filter.validate(schema)?;
        Ok(self.driver.count(schema, filter)?)
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
            info!(engine = self.driver.engine(), "document store disconnected");
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serializes a record into its document form.
fn encode(schema: &RecordSchema, record: &Record) -> Result<Document, StoreError> {
    let StorageForm::Document(document) = to_storage_form(record, schema, BackendKind::Document)? else {
        return Err(StoreError::Backend("serializer produced a non-document form".to_string()));
    };
    Ok(document)
}

/// Decodes a stored document into a record.
fn decode(schema: &RecordSchema, document: Document) -> Result<Record, StoreError> {
    Ok(from_storage_form(&StorageForm::Document(document), schema, BackendKind::Document)?)
}
