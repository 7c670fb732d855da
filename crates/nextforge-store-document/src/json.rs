// crates/nextforge-store-document/src/json.rs
// ============================================================================
// Module: Nextforge JSON File Driver
// Description: Embedded document engine backed by one JSON file per collection.
// Purpose: Provide a document backend without an external server.
// Dependencies: serde, serde_json, tempfile, tracing
// ============================================================================

//! ## Overview
//! Each collection lives in `<directory>/<collection>.json`: a header naming
//! the file format, the collection, and its index definitions, followed by
//! the documents keyed by storage id. The whole collection is held in memory
//! behind a lock; every write rewrites the file atomically (temp file in the
//! same directory, fsync, rename) before the in-memory state changes.
//! A batch is staged on a copy of the documents and persisted once, so a
//! failed batch leaves both the file and the memory state untouched.
//!
//! Timestamps are written as `{"$date": millis}`; document keys never start
//! with `$`, so the marker is unambiguous.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::ops::Bound;
use std::path::Path;
use std::path::PathBuf;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use nextforge_core::BackendKind;
use nextforge_core::DocValue;
use nextforge_core::Document;
use nextforge_core::Filter;
use nextforge_core::IndexSpec;
use nextforge_core::JSON_DATE_KEY;
use nextforge_core::RecordSchema;
use nextforge_core::StorageForm;
use nextforge_core::Timestamp;
use nextforge_core::from_storage_form;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map as JsonMap;
use serde_json::Number;
use serde_json::Value as JsonValue;
use tempfile::NamedTempFile;
use tracing::info;

use crate::driver::DocumentDriver;
use crate::driver::DocumentWrite;
use crate::driver::DriverError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File format identifier written in every header.
pub const JSON_STORE_FORMAT: &str = "nextforge-json-store";

/// Current file format version.
pub const JSON_STORE_VERSION: u32 = 1;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Options for the JSON file engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonStoreOptions {
    /// Directory holding one file per collection.
    pub directory: PathBuf,
    /// Pretty-print collection files.
    pub pretty: bool,
}

impl JsonStoreOptions {
    /// Compact-output options for `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            pretty: false,
        }
    }
}

// ============================================================================
// SECTION: File Model
// ============================================================================

/// On-disk collection file.
#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    /// Always [`JSON_STORE_FORMAT`].
    format: String,
    /// Format version.
    version: u32,
    /// Collection the file belongs to.
    collection: String,
    /// Index definitions.
    #[serde(default)]
    indexes: Vec<IndexSpec>,
    /// Documents keyed by storage id.
    #[serde(default)]
    documents: BTreeMap<String, JsonValue>,
}

/// In-memory collection state.
#[derive(Debug, Default)]
struct LoadedCollection {
    /// Index definitions recorded in the header.
    indexes: Vec<IndexSpec>,
    /// Documents keyed by storage id.
    documents: BTreeMap<String, Document>,
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// JSON file document driver.
#[derive(Debug)]
pub struct JsonFileDriver {
    /// Collection directory.
    directory: PathBuf,
    /// Pretty-print output.
    pretty: bool,
    /// Prepared collections keyed by name.
    collections: RwLock<BTreeMap<String, LoadedCollection>>,
    /// Set once closed.
    closed: AtomicBool,
}

impl JsonFileDriver {
    /// Opens (creating when needed) the collection directory.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Unreachable`] when the directory cannot be
    /// created or is not a directory.
    pub fn open(options: &JsonStoreOptions) -> Result<Self, DriverError> {
        if options.directory.exists() && !options.directory.is_dir() {
            return Err(DriverError::Unreachable(format!(
                "{} is not a directory",
                options.directory.display()
            )));
        }
        fs::create_dir_all(&options.directory).map_err(|err| DriverError::Unreachable(err.to_string()))?;
        Ok(Self {
            directory: options.directory.clone(),
            pretty: options.pretty,
            collections: RwLock::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the file path for a collection.
    fn path_for(&self, collection: &str) -> PathBuf {
        self.directory.join(format!("{collection}.json"))
    }

    /// Fails once the driver is closed.
    fn check_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        Ok(())
    }

    /// Loads a collection file, or an empty collection when absent.
    fn load(&self, schema: &RecordSchema) -> Result<(LoadedCollection, bool), DriverError> {
        let path = self.path_for(&schema.collection);
        if !path.exists() {
            return Ok((LoadedCollection::default(), false));
        }
        let text = fs::read_to_string(&path)
            .map_err(|err| DriverError::Mismatch(format!("{}: {err}", path.display())))?;
        let file: CollectionFile = serde_json::from_str(&text)
            .map_err(|err| DriverError::Mismatch(format!("{}: {err}", path.display())))?;
        if file.format != JSON_STORE_FORMAT || file.version != JSON_STORE_VERSION {
            return Err(DriverError::Mismatch(format!(
                "{} has format {} version {}",
                path.display(),
                file.format,
                file.version
            )));
        }
        if file.collection != schema.collection {
            return Err(DriverError::Mismatch(format!(
                "{} belongs to collection {}",
                path.display(),
                file.collection
            )));
        }
        let mut documents = BTreeMap::new();
        for (id, value) in file.documents {
            let DocValue::Document(fields) = json_to_doc(value)? else {
                return Err(DriverError::Mismatch(format!("document {id} is not an object")));
            };
            documents.insert(
                id,
                Document {
                    fields,
                },
            );
        }
        Ok((
            LoadedCollection {
                indexes: file.indexes,
                documents,
            },
            true,
        ))
    }

    /// Writes a collection file atomically.
    fn persist(&self, collection: &str, state: &LoadedCollection) -> Result<(), DriverError> {
        let mut documents = BTreeMap::new();
        for (id, document) in &state.documents {
            documents.insert(id.clone(), doc_to_json(&DocValue::Document(document.fields.clone()))?);
        }
        let file = CollectionFile {
            format: JSON_STORE_FORMAT.to_string(),
            version: JSON_STORE_VERSION,
            collection: collection.to_string(),
            indexes: state.indexes.clone(),
            documents,
        };
        let bytes = if self.pretty { serde_json::to_vec_pretty(&file) } else { serde_json::to_vec(&file) }
            .map_err(|err| DriverError::Operation(err.to_string()))?;
        atomic_write(&self.directory, &self.path_for(collection), &bytes)
            .map_err(|err| DriverError::Operation(format!("write {collection}: {err}")))
    }

    /// Runs `f` over a prepared collection under the read lock.
    fn read<T>(
        &self,
        schema: &RecordSchema,
        f: impl FnOnce(&LoadedCollection) -> Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        self.check_open()?;
        let guard = self.collections.read().map_err(|_| lock_poisoned())?;
        let state = guard.get(&schema.collection).ok_or_else(|| not_prepared(&schema.collection))?;
        f(state)
    }

    /// Visits matching documents in storage id order after `after`.
    fn scan(
        state: &LoadedCollection,
        schema: &RecordSchema,
        filter: &Filter,
        after: Option<&str>,
        mut visit: impl FnMut(&Document) -> bool,
    ) -> Result<(), DriverError> {
        let lower = after.map_or(Bound::Unbounded, |after| Bound::Excluded(after.to_string()));
        for document in state.documents.range((lower, Bound::Unbounded)).map(|(_, document)| document) {
            let record = from_storage_form(&StorageForm::Document(document.clone()), schema, BackendKind::Document)
                .map_err(|err| DriverError::Operation(err.to_string()))?;
            if filter.matches(&record) && !visit(document) {
                break;
            }
        }
        Ok(())
    }
}

impl DocumentDriver for JsonFileDriver {
    fn engine(&self) -> &'static str {
        "json"
    }

    fn ensure_collection(&self, schema: &RecordSchema) -> Result<(), DriverError> {
        self.check_open()?;
        let mut guard = self.collections.write().map_err(|_| lock_poisoned())?;
        let (mut state, existed) = self.load(schema)?;
        let mut changed = !existed;
        for index in &schema.indexes {
            match state.indexes.iter().position(|stored| stored.name == index.name) {
                Some(position) if state.indexes[position] == *index => {}
                Some(position) => {
                    check_unique(&state, index)?;
                    state.indexes[position] = index.clone();
                    changed = true;
                    info!(collection = %schema.collection, index = %index.name, "recreated index with new definition");
                }
                None => {
                    check_unique(&state, index)?;
                    state.indexes.push(index.clone());
                    changed = true;
                    info!(collection = %schema.collection, index = %index.name, "created index");
                }
            }
        }
        if changed {
            self.persist(&schema.collection, &state).map_err(|err| DriverError::Mismatch(err.to_string()))?;
        }
        guard.insert(schema.collection.clone(), state);
        Ok(())
    }

    fn find_one(&self, schema: &RecordSchema, id: &str) -> Result<Option<Document>, DriverError> {
        self.read(schema, |state| Ok(state.documents.get(id).cloned()))
    }

    fn replace(&self, schema: &RecordSchema, id: &str, document: Document) -> Result<(), DriverError> {
        self.check_open()?;
        let mut guard = self.collections.write().map_err(|_| lock_poisoned())?;
        let state = guard.get_mut(&schema.collection).ok_or_else(|| not_prepared(&schema.collection))?;
        check_replace(&state.documents, schema, id, &document)?;
        let previous = state.documents.insert(id.to_string(), document);
        if let Err(err) = self.persist(&schema.collection, state) {
            match previous {
                Some(previous) => state.documents.insert(id.to_string(), previous),
                None => state.documents.remove(id),
            };
            return Err(err);
        }
        Ok(())
    }

    fn remove(&self, schema: &RecordSchema, id: &str) -> Result<bool, DriverError> {
        self.check_open()?;
        let mut guard = self.collections.write().map_err(|_| lock_poisoned())?;
        let state = guard.get_mut(&schema.collection).ok_or_else(|| not_prepared(&schema.collection))?;
        let Some(previous) = state.documents.remove(id) else {
            return Ok(false);
        };
        if let Err(err) = self.persist(&schema.collection, state) {
            state.documents.insert(id.to_string(), previous);
            return Err(err);
        }
        Ok(true)
    }

    fn apply_batch(&self, schema: &RecordSchema, writes: Vec<DocumentWrite>) -> Result<(), DriverError> {
        self.check_open()?;
        let mut guard = self.collections.write().map_err(|_| lock_poisoned())?;
        let state = guard.get_mut(&schema.collection).ok_or_else(|| not_prepared(&schema.collection))?;
        let mut staged = state.documents.clone();
        for (index, write) in writes.into_iter().enumerate() {
            match write {
                DocumentWrite::Replace {
                    id,
                    document,
                } => {
                    check_replace(&staged, schema, &id, &document)?;
                    staged.insert(id, document);
                }
                DocumentWrite::Remove {
                    id,
                } => {
                    if staged.remove(&id).is_none() {
                        return Err(DriverError::Missing(index));
                    }
                }
            }
        }
        let previous = std::mem::replace(&mut state.documents, staged);
        if let Err(err) = self.persist(&schema.collection, state) {
            state.documents = previous;
            return Err(err);
        }
        Ok(())
    }

    fn find_page(
        &self,
        schema: &RecordSchema,
        filter: &Filter,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Document>, DriverError> {
        self.read(schema, |state| {
            let mut page = Vec::new();
            if limit == 0 {
                return Ok(page);
            }
            Self::scan(state, schema, filter, after, |document| {
                page.push(document.clone());
                page.len() < limit
            })?;
            Ok(page)
        })
    }

    fn count(&self, schema: &RecordSchema, filter: &Filter) -> Result<u64, DriverError> {
        self.read(schema, |state| {
            let mut count = 0_u64;
            Self::scan(state, schema, filter, None, |_| {
                count += 1;
                true
            })?;
            Ok(count)
        })
    }

    fn ping(&self) -> Result<(), DriverError> {
        self.check_open()?;
        match fs::metadata(&self.directory) {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(DriverError::Unreachable(format!("{} is not a directory", self.directory.display()))),
            Err(err) => Err(DriverError::Unreachable(err.to_string())),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.collections.write() {
            guard.clear();
        }
    }
}

// ============================================================================
// SECTION: Unique Indexes
// ============================================================================

/// Returns the index key of a document; `None` when any field is absent.
fn index_key<'a>(index: &IndexSpec, document: &'a Document) -> Option<Vec<&'a DocValue>> {
    index
        .fields
        .iter()
        .map(|field| document.fields.get(field).filter(|value| !matches!(value, DocValue::Null)))
        .collect()
}

/// Returns the id of another document sharing the unique index key.
fn unique_conflict(
    documents: &BTreeMap<String, Document>,
    index: &IndexSpec,
    id: &str,
    document: &Document,
) -> Option<String> {
    let key = index_key(index, document)?;
    documents
        .iter()
        .find(|(other_id, other)| other_id.as_str() != id && index_key(index, other).as_ref() == Some(&key))
        .map(|(other_id, _)| other_id.clone())
}

/// Fails when writing `document` under `id` would violate a unique index.
fn check_replace(
    documents: &BTreeMap<String, Document>,
    schema: &RecordSchema,
    id: &str,
    document: &Document,
) -> Result<(), DriverError> {
    for index in schema.indexes.iter().filter(|index| index.unique) {
        if let Some(other) = unique_conflict(documents, index, id, document) {
            return Err(DriverError::Operation(format!(
                "duplicate value for unique index {} (conflicts with {other})",
                index.name
            )));
        }
    }
    Ok(())
}

/// Fails when existing documents already violate a unique index.
fn check_unique(state: &LoadedCollection, index: &IndexSpec) -> Result<(), DriverError> {
    if !index.unique {
        return Ok(());
    }
    for (id, document) in &state.documents {
        if let Some(other) = unique_conflict(&state.documents, index, id, document) {
            return Err(DriverError::Mismatch(format!(
                "documents {id} and {other} violate unique index {}",
                index.name
            )));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: JSON Conversion
// ============================================================================

/// Converts a document value to JSON.
fn doc_to_json(value: &DocValue) -> Result<JsonValue, DriverError> {
    Ok(match value {
        DocValue::Null => JsonValue::Null,
        DocValue::Bool(flag) => JsonValue::Bool(*flag),
        DocValue::Int(number) => JsonValue::from(*number),
        DocValue::Float(number) => Number::from_f64(*number)
            .map(JsonValue::Number)
            .ok_or_else(|| DriverError::Operation("non-finite float".to_string()))?,
        DocValue::String(text) => JsonValue::String(text.clone()),
        DocValue::DateTime(ts) => {
            let mut date = JsonMap::new();
            date.insert(JSON_DATE_KEY.to_string(), JsonValue::from(ts.as_unix_millis()));
            JsonValue::Object(date)
        }
        DocValue::Document(fields) => {
            let mut object = JsonMap::new();
            for (name, value) in fields {
                object.insert(name.clone(), doc_to_json(value)?);
            }
            JsonValue::Object(object)
        }
    })
}

/// Converts JSON back into a document value.
fn json_to_doc(value: JsonValue) -> Result<DocValue, DriverError> {
    Ok(match value {
        JsonValue::Null => DocValue::Null,
        JsonValue::Bool(flag) => DocValue::Bool(flag),
        JsonValue::Number(number) => {
            if let Some(int) = number.as_i64() {
                DocValue::Int(int)
            } else if number.is_f64() {
                DocValue::Float(number.as_f64().unwrap_or_default())
            } else {
                return Err(DriverError::Mismatch(format!("integer {number} is out of range")));
            }
        }
        JsonValue::String(text) => DocValue::String(text),
        JsonValue::Object(object) => {
            if object.len() == 1
                && let Some(millis) = object.get(JSON_DATE_KEY).and_then(JsonValue::as_i64)
            {
                return Ok(DocValue::DateTime(Timestamp::from_unix_millis(millis)));
            }
            let mut fields = BTreeMap::new();
            for (name, value) in object {
                fields.insert(name, json_to_doc(value)?);
            }
            DocValue::Document(fields)
        }
        JsonValue::Array(_) => return Err(DriverError::Mismatch("arrays are not supported".to_string())),
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes `bytes` to `target` through a synced temp file in `dir`.
fn atomic_write(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|err| err.error)?;
    Ok(())
}

/// Error for a poisoned state lock.
fn lock_poisoned() -> DriverError {
    DriverError::Operation("json store lock poisoned".to_string())
}

/// Error for a collection that was never prepared.
fn not_prepared(collection: &str) -> DriverError {
    DriverError::Operation(format!("collection {collection} is not prepared"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use nextforge_core::FieldType;

    use super::*;

    fn schema() -> RecordSchema {
        RecordSchema::new("players").field("name", FieldType::String).unique_index("by_name", &["name"])
    }

    fn document(id: &str, name: &str) -> Document {
        Document {
            fields: BTreeMap::from([
                ("_id".to_string(), DocValue::String(id.to_string())),
                ("name".to_string(), DocValue::String(name.to_string())),
            ]),
        }
    }

    #[test]
    fn json_values_round_trip() {
        let value = DocValue::Document(BTreeMap::from([
            ("at".to_string(), DocValue::DateTime(Timestamp::from_unix_millis(42))),
            ("ratio".to_string(), DocValue::Float(1.0)),
            ("count".to_string(), DocValue::Int(-3)),
        ]));
        let json = doc_to_json(&value).unwrap();
        assert_eq!(json_to_doc(json).unwrap(), value);
    }

    #[test]
    fn header_names_the_collection() {
        let dir = tempfile::tempdir().unwrap();
        let driver = JsonFileDriver::open(&JsonStoreOptions::new(dir.path())).unwrap();
        driver.ensure_collection(&schema()).unwrap();
        let text = fs::read_to_string(dir.path().join("players.json")).unwrap();
        let file: CollectionFile = serde_json::from_str(&text).unwrap();
        assert_eq!(file.format, JSON_STORE_FORMAT);
        assert_eq!(file.collection, "players");
        assert_eq!(file.indexes, schema().indexes);
    }

    #[test]
    fn unique_index_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let driver = JsonFileDriver::open(&JsonStoreOptions::new(dir.path())).unwrap();
        let schema = schema();
        driver.ensure_collection(&schema).unwrap();
        driver.replace(&schema, "p1", document("p1", "ann")).unwrap();
        driver.replace(&schema, "p1", document("p1", "ann")).unwrap();
        assert!(matches!(
            driver.replace(&schema, "p2", document("p2", "ann")),
            Err(DriverError::Operation(_))
        ));
        assert!(driver.find_one(&schema, "p2").unwrap().is_none());
    }

    #[test]
    fn failed_batch_leaves_file_and_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let driver = JsonFileDriver::open(&JsonStoreOptions::new(dir.path())).unwrap();
        let schema = schema();
        driver.ensure_collection(&schema).unwrap();
        driver.replace(&schema, "p0", document("p0", "zed")).unwrap();
        let before = fs::read(dir.path().join("players.json")).unwrap();

        let writes = vec![
            DocumentWrite::Replace {
                id: "p1".to_string(),
                document: document("p1", "ann"),
            },
            DocumentWrite::Replace {
                id: "p2".to_string(),
                document: document("p2", "ann"),
            },
        ];
        assert!(matches!(driver.apply_batch(&schema, writes), Err(DriverError::Operation(_))));
        assert_eq!(fs::read(dir.path().join("players.json")).unwrap(), before);
        assert!(driver.find_one(&schema, "p1").unwrap().is_none());

        let writes = vec![
            DocumentWrite::Remove {
                id: "p0".to_string(),
            },
            DocumentWrite::Remove {
                id: "p0".to_string(),
            },
        ];
        assert_eq!(driver.apply_batch(&schema, writes), Err(DriverError::Missing(1)));
        assert!(driver.find_one(&schema, "p0").unwrap().is_some());
    }

    #[test]
    fn open_rejects_a_file_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            JsonFileDriver::open(&JsonStoreOptions::new(file.path())),
            Err(DriverError::Unreachable(_))
        ));
    }
}
