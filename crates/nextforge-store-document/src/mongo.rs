// crates/nextforge-store-document/src/mongo.rs
// ============================================================================
// Module: Nextforge MongoDB Driver
// Description: MongoDB engine behind the `mongo` backend.
// Purpose: Provide a networked document engine.
// Dependencies: mongodb (sync API)
// ============================================================================

//! ## Overview
//! [`MongoDriver`] wraps the synchronous `MongoDB` client, which pools
//! connections internally. Filters become query documents combined with
//! `$and`; paging sorts on `_id` and bounds it with `$gt`. Unique indexes
//! carry a partial filter so documents missing an indexed field never
//! collide, matching the relational engines where `NULL`s are distinct.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use mongodb::IndexModel;
use mongodb::bson::Bson;
use mongodb::bson::DateTime as BsonDateTime;
use mongodb::bson::Document as BsonDocument;
use mongodb::bson::doc;
use mongodb::error::Error as MongoError;
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::options::Credential;
use mongodb::options::FindOptions;
use mongodb::options::IndexOptions;
use mongodb::options::ReplaceOptions;
use mongodb::options::ServerAddress;
use mongodb::sync::Client;
use mongodb::sync::Collection;
use mongodb::sync::Database;
use nextforge_core::DOCUMENT_ID_FIELD;
use nextforge_core::DocValue;
use nextforge_core::Document;
use nextforge_core::FieldValue;
use nextforge_core::Filter;
use nextforge_core::IndexSpec;
use nextforge_core::RecordSchema;
use nextforge_core::Timestamp;
use tracing::debug;
use tracing::info;

use crate::driver::DocumentDriver;
use crate::driver::DriverError;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Name of the index `MongoDB` maintains on `_id`.
const ID_INDEX_NAME: &str = "_id_";

/// Connection options for a `MongoDB` deployment.
#[derive(Clone, PartialEq, Eq)]
pub struct MongoOptions {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// User name; `None` connects without authentication.
    pub user: Option<String>,
    /// Password (never logged).
    pub password: Option<String>,
    /// Database name.
    pub database: String,
    /// Authentication database.
    pub auth_source: String,
    /// Connect and server selection timeout.
    pub connect_timeout: Duration,
}

impl fmt::Debug for MongoOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("auth_source", &self.auth_source)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// `MongoDB` document driver.
pub struct MongoDriver {
    /// Client; `None` once closed.
    client: Mutex<Option<Client>>,
    /// Database name.
    database: String,
}

impl MongoDriver {
    /// Connects and verifies the deployment with a `ping` command.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Auth`] for rejected credentials and
    /// [`DriverError::Unreachable`] when no server can be selected.
    pub fn open(options: &MongoOptions) -> Result<Self, DriverError> {
        let credential = options.user.as_ref().map(|user| {
            Credential::builder()
                .username(Some(user.clone()))
                .password(options.password.clone())
                .source(Some(options.auth_source.clone()))
                .build()
        });
        let client_options = ClientOptions::builder()
            .hosts(vec![ServerAddress::Tcp {
                host: options.host.clone(),
                port: Some(options.port),
            }])
            .credential(credential)
            .connect_timeout(Some(options.connect_timeout))
            .server_selection_timeout(Some(options.connect_timeout))
            .app_name(Some("nextforge".to_string()))
            .build();
        let client = Client::with_options(client_options).map_err(map_error)?;
        let driver = Self {
            client: Mutex::new(Some(client)),
            database: options.database.clone(),
        };
        driver.ping()?;
        Ok(driver)
    }

    /// Returns the database handle.
    fn database(&self) -> Result<Database, DriverError> {
        let guard = self.client.lock().map_err(|_| DriverError::Operation("mongo client mutex poisoned".to_string()))?;
        let client = guard.as_ref().ok_or(DriverError::Closed)?;
        Ok(client.database(&self.database))
    }

    /// Returns the collection handle for a schema.
    fn collection(&self, schema: &RecordSchema) -> Result<Collection<BsonDocument>, DriverError> {
        Ok(self.database()?.collection::<BsonDocument>(&schema.collection))
    }
}

impl DocumentDriver for MongoDriver {
    fn engine(&self) -> &'static str {
        "mongo"
    }

    fn ensure_collection(&self, schema: &RecordSchema) -> Result<(), DriverError> {
        let collection = self.collection(schema)?;
        let mut existing = Vec::new();
        let indexes = match collection.list_indexes(None) {
            Ok(cursor) => cursor,
            Err(err) if is_namespace_missing(&err) => {
                return create_indexes(&collection, schema, schema.indexes.iter());
            }
            Err(err) => return Err(map_error(err)),
        };
        for model in indexes {
            existing.push(model.map_err(map_error)?);
        }
        let mut missing = Vec::new();
        for index in &schema.indexes {
            let desired = index_model(index);
            let current = existing
                .iter()
                .find(|model| model.options.as_ref().and_then(|options| options.name.as_deref()) == Some(index.name.as_str()));
            match current {
                None => missing.push(index),
                Some(model) if same_definition(model, &desired) => {
                    debug!(collection = %schema.collection, index = %index.name, "index present");
                }
                Some(_) => {
                    collection.drop_index(&index.name, None).map_err(map_error)?;
                    info!(collection = %schema.collection, index = %index.name, "dropped index with outdated definition");
                    missing.push(index);
                }
            }
        }
        create_indexes(&collection, schema, missing.into_iter())
    }

    fn find_one(&self, schema: &RecordSchema, id: &str) -> Result<Option<Document>, DriverError> {
        let found = self.collection(schema)?.find_one(doc! { DOCUMENT_ID_FIELD: id }, None).map_err(map_error)?;
        found.map(from_bson_document).transpose()
    }

    fn replace(&self, schema: &RecordSchema, id: &str, document: Document) -> Result<(), DriverError> {
        let options = ReplaceOptions::builder().upsert(Some(true)).build();
        self.collection(schema)?
            .replace_one(doc! { DOCUMENT_ID_FIELD: id }, to_bson_document(&document), options)
            .map_err(map_error)?;
        Ok(())
    }

    fn remove(&self, schema: &RecordSchema, id: &str) -> Result<bool, DriverError> {
        let result = self.collection(schema)?.delete_one(doc! { DOCUMENT_ID_FIELD: id }, None).map_err(map_error)?;
        Ok(result.deleted_count > 0)
    }

    fn find_page(
        &self,
        schema: &RecordSchema,
        filter: &Filter,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Document>, DriverError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let options = FindOptions::builder()
            .sort(Some(doc! { DOCUMENT_ID_FIELD: 1 }))
            .limit(Some(i64::try_from(limit).unwrap_or(i64::MAX)))
            .build();
        let cursor = self.collection(schema)?.find(query_document(filter, after), options).map_err(map_error)?;
        let mut page = Vec::new();
        for document in cursor {
            page.push(from_bson_document(document.map_err(map_error)?)?);
        }
        Ok(page)
    }

    fn count(&self, schema: &RecordSchema, filter: &Filter) -> Result<u64, DriverError> {
        self.collection(schema)?.count_documents(query_document(filter, None), None).map_err(map_error)
    }

    fn ping(&self) -> Result<(), DriverError> {
        self.database()?.run_command(doc! { "ping": 1 }, None).map_err(map_error)?;
        Ok(())
    }

    fn close(&self) {
        if let Ok(mut guard) = self.client.lock() {
            guard.take();
        }
    }
}

// ============================================================================
// SECTION: Indexes
// ============================================================================

/// Builds the index model for a declared index.
fn index_model(index: &IndexSpec) -> IndexModel {
    let mut keys = BsonDocument::new();
    for field in &index.fields {
        keys.insert(field.clone(), 1_i32);
    }
    let mut options = IndexOptions::builder().name(Some(index.name.clone())).build();
    if index.unique {
        options.unique = Some(true);
        let mut partial = BsonDocument::new();
        for field in &index.fields {
            partial.insert(field.clone(), doc! { "$exists": true });
        }
        options.partial_filter_expression = Some(partial);
    }
    IndexModel::builder().keys(keys).options(Some(options)).build()
}

/// Returns true when an existing index matches the desired definition.
fn same_definition(current: &IndexModel, desired: &IndexModel) -> bool {
    let unique = |model: &IndexModel| model.options.as_ref().and_then(|options| options.unique).unwrap_or(false);
    let partial = |model: &IndexModel| {
        model.options.as_ref().and_then(|options| options.partial_filter_expression.clone())
    };
    current.keys == desired.keys && unique(current) == unique(desired) && partial(current) == partial(desired)
}

/// Creates indexes one at a time.
fn create_indexes<'a>(
    collection: &Collection<BsonDocument>,
    schema: &RecordSchema,
    indexes: impl Iterator<Item = &'a IndexSpec>,
) -> Result<(), DriverError> {
    for index in indexes {
        if index.name == ID_INDEX_NAME {
            continue;
        }
        collection.create_index(index_model(index), None).map_err(map_error)?;
        info!(collection = %schema.collection, index = %index.name, unique = index.unique, "created index");
    }
    Ok(())
}

/// Returns true for the "namespace not found" server error.
fn is_namespace_missing(err: &MongoError) -> bool {
    matches!(&*err.kind, ErrorKind::Command(command) if command.code == 26)
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Translates a filter and keyset cursor into a query document.
fn query_document(filter: &Filter, after: Option<&str>) -> BsonDocument {
    let mut clauses = filter
        .predicates()
        .iter()
        .map(|predicate| {
            let field = if predicate.is_key() { DOCUMENT_ID_FIELD } else { predicate.field.as_str() };
            let mut condition = BsonDocument::new();
            condition.insert(predicate.op.document_operator(), operand(&predicate.value));
            let mut clause = BsonDocument::new();
            clause.insert(field, condition);
            Bson::Document(clause)
        })
        .collect::<Vec<_>>();
    if let Some(after) = after {
        clauses.push(Bson::Document(doc! { DOCUMENT_ID_FIELD: { "$gt": after } }));
    }
    match clauses.len() {
        0 => BsonDocument::new(),
        1 => match clauses.pop() {
            Some(Bson::Document(clause)) => clause,
            _ => BsonDocument::new(),
        },
        _ => doc! { "$and": clauses },
    }
}

/// Converts a scalar filter operand into BSON.
fn operand(value: &FieldValue) -> Bson {
    match value {
        FieldValue::String(text) => Bson::String(text.clone()),
        FieldValue::Integer(number) => Bson::Int64(*number),
        FieldValue::Float(number) => Bson::Double(*number),
        FieldValue::Bool(flag) => Bson::Boolean(*flag),
        FieldValue::Timestamp(ts) => Bson::DateTime(BsonDateTime::from_millis(ts.as_unix_millis())),
        // Maps cannot be indexed, so validated filters never carry one.
        FieldValue::Map(_) => Bson::Null,
    }
}

// ============================================================================
// SECTION: BSON Conversion
// ============================================================================

/// Converts a document into BSON.
fn to_bson_document(document: &Document) -> BsonDocument {
    document.fields.iter().map(|(name, value)| (name.clone(), to_bson(value))).collect()
}

/// Converts a document value into BSON.
fn to_bson(value: &DocValue) -> Bson {
    match value {
        DocValue::Null => Bson::Null,
        DocValue::Bool(flag) => Bson::Boolean(*flag),
        DocValue::Int(number) => Bson::Int64(*number),
        DocValue::Float(number) => Bson::Double(*number),
        DocValue::String(text) => Bson::String(text.clone()),
        DocValue::DateTime(ts) => Bson::DateTime(BsonDateTime::from_millis(ts.as_unix_millis())),
        DocValue::Document(fields) => {
            Bson::Document(fields.iter().map(|(name, value)| (name.clone(), to_bson(value))).collect())
        }
    }
}

/// Converts a BSON document into a document.
fn from_bson_document(document: BsonDocument) -> Result<Document, DriverError> {
    let mut fields = std::collections::BTreeMap::new();
    for (name, value) in document {
        let value = from_bson(&name, value)?;
        fields.insert(name, value);
    }
    Ok(Document {
        fields,
    })
}

/// Converts a BSON value into a document value.
fn from_bson(field: &str, value: Bson) -> Result<DocValue, DriverError> {
    Ok(match value {
        Bson::Null => DocValue::Null,
        Bson::Boolean(flag) => DocValue::Bool(flag),
        Bson::Int32(number) => DocValue::Int(i64::from(number)),
        Bson::Int64(number) => DocValue::Int(number),
        Bson::Double(number) => DocValue::Float(number),
        Bson::String(text) => DocValue::String(text),
        Bson::DateTime(date) => DocValue::DateTime(Timestamp::from_unix_millis(date.timestamp_millis())),
        Bson::ObjectId(id) => DocValue::String(id.to_hex()),
        Bson::Document(nested) => DocValue::Document(from_bson_document(nested)?.fields),
        other => {
            return Err(DriverError::Operation(format!(
                "field {field} holds unsupported BSON element type 0x{:02x}",
                other.element_type() as u8
            )));
        }
    })
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Maps a client error onto a driver error category.
fn map_error(err: MongoError) -> DriverError {
    match &*err.kind {
        ErrorKind::Authentication {
            ..
        } => DriverError::Auth(err.to_string()),
        ErrorKind::ServerSelection {
            ..
        }
        | ErrorKind::Io(_)
        | ErrorKind::DnsResolve {
            ..
        }
        | ErrorKind::ConnectionPoolCleared {
            ..
        } => DriverError::Unreachable(err.to_string()),
        _ => DriverError::Operation(err.to_string()),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
