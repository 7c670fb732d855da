// crates/nextforge-store-relational/tests/sqlite_store.rs
// ============================================================================
// Module: Relational Store Integration Tests
// Description: Record store behavior over the embedded SQLite engine.
// Purpose: Validate CRUD, paging, filters, and table reconciliation.
// Dependencies: nextforge-store-relational, nextforge-core, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Drives [`RelationalStore`] through the record store contract against
//! file-backed and in-memory `SQLite` databases, including tables created
//! by earlier schema versions or by hand.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nextforge_core::ConnectionErrorKind;
use nextforge_core::FieldType;
use nextforge_core::FieldValue;
use nextforge_core::Filter;
use nextforge_core::HealthStatus;
use nextforge_core::KEY_FIELD;
use nextforge_core::Record;
use nextforge_core::RecordCursor;
use nextforge_core::RecordKey;
use nextforge_core::RecordSchema;
use nextforge_core::RecordStore;
use nextforge_core::StoreError;
use nextforge_core::Timestamp;
use nextforge_store_relational::RelationalStore;
use nextforge_store_relational::SqliteDriver;
use nextforge_store_relational::SqliteOptions;
use proptest::prelude::*;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn players() -> RecordSchema {
    RecordSchema::new("players")
        .field("name", FieldType::String)
        .field("balance", FieldType::Integer)
        .optional_field("vip", FieldType::Bool)
        .optional_field("rating", FieldType::Float)
        .optional_field("joined", FieldType::Timestamp)
        .optional_field("settings", FieldType::Map)
        .index("by_balance", &["balance"])
        .unique_index("by_name", &["name"])
}

fn open(path: &Path, schemas: &[RecordSchema]) -> Result<RelationalStore, nextforge_core::ConnectionError> {
    let driver = SqliteDriver::open(&SqliteOptions::file(path)).unwrap();
    RelationalStore::connect(Box::new(driver), schemas)
}

fn memory_store() -> RelationalStore {
    let driver = SqliteDriver::open(&SqliteOptions::in_memory()).unwrap();
    RelationalStore::connect(Box::new(driver), &[players()]).unwrap()
}

fn player(key: &str, balance: i64) -> Record {
    Record::new(RecordKey::single(key).unwrap())
        .with_field("name", format!("name-{key}"))
        .with_field("balance", balance)
}

fn keys(records: &[Record]) -> Vec<String> {
    records.iter().map(|record| record.key.storage_id()).collect()
}

fn listed(store: &dyn RecordStore, filter: Filter, page_size: usize) -> Vec<String> {
    RecordCursor::with_page_size(store, "players", filter, page_size)
        .map(|record| record.unwrap().key.storage_id())
        .collect()
}

// ============================================================================
// SECTION: CRUD
// ============================================================================

/// Tests that every field type survives a write and read.
#[test]
fn put_then_get_returns_written_record() {
    let store = memory_store();
    let settings = BTreeMap::from([
        ("volume".to_string(), FieldValue::Integer(7)),
        ("since".to_string(), FieldValue::Timestamp(Timestamp::from_unix_millis(1_700_000_000_000))),
    ]);
    let record = player("p1", 100)
        .with_field("vip", true)
        .with_field("rating", 4.5)
        .with_field("joined", Timestamp::from_unix_millis(1_699_999_999_123))
        .with_field("settings", settings);
    store.put("players", &record).unwrap();
    assert_eq!(store.get("players", &record.key).unwrap(), record);
}

/// Tests the scenario record with a minimal key and balance.
#[test]
fn balance_record_round_trips() {
    let schema = RecordSchema::new("accounts").field("balance", FieldType::Integer);
    let driver = SqliteDriver::open(&SqliteOptions::in_memory()).unwrap();
    let store = RelationalStore::connect(Box::new(driver), &[schema]).unwrap();
    let record = Record::new(RecordKey::single("p1").unwrap()).with_field("balance", 100_i64);
    store.put("accounts", &record).unwrap();
    let loaded = store.get("accounts", &RecordKey::single("p1").unwrap()).unwrap();
    assert_eq!(loaded.get("balance"), Some(&FieldValue::Integer(100)));
}

/// Tests that put fully replaces the prior value.
#[test]
fn put_replaces_without_merging() {
    let store = memory_store();
    store.put("players", &player("p1", 100).with_field("vip", true)).unwrap();
    store.put("players", &player("p1", 250)).unwrap();
    let loaded = store.get("players", &RecordKey::single("p1").unwrap()).unwrap();
    assert_eq!(loaded, player("p1", 250));
    assert_eq!(store.count("players", &Filter::all()).unwrap(), 1);
}

/// Tests that delete removes the record and reports missing keys.
#[test]
fn delete_then_get_reports_not_found() {
    let store = memory_store();
    let key = RecordKey::single("p1").unwrap();
    store.put("players", &player("p1", 1)).unwrap();
    store.delete("players", &key).unwrap();
    assert!(matches!(store.get("players", &key), Err(StoreError::NotFound { .. })));
    assert!(matches!(store.delete("players", &key), Err(StoreError::NotFound { .. })));
    assert!(!store.exists("players", &key).unwrap());
}

/// Tests composite keys through the storage id.
#[test]
fn composite_keys_address_distinct_rows() {
    let store = memory_store();
    let first = Record::new(RecordKey::composite(["guild", "p1"]).unwrap())
        .with_field("name", "a")
        .with_field("balance", 1_i64);
    let second = Record::new(RecordKey::composite(["guild:p1", "x"]).unwrap())
        .with_field("name", "b")
        .with_field("balance", 2_i64);
    store.put("players", &first).unwrap();
    store.put("players", &second).unwrap();
    assert_eq!(store.get("players", &first.key).unwrap(), first);
    assert_eq!(store.get("players", &second.key).unwrap(), second);
}

/// Tests that undeclared record fields are dropped on write.
#[test]
fn extra_fields_are_dropped() {
    let store = memory_store();
    let mut record = player("p1", 5);
    record.extra.insert("legacy".to_string(), FieldValue::String("x".to_string()));
    store.put("players", &record).unwrap();
    let loaded = store.get("players", &record.key).unwrap();
    assert!(loaded.extra.is_empty());
    assert_eq!(loaded, player("p1", 5));
}

/// Tests that a unique index conflict fails instead of replacing.
#[test]
fn unique_index_conflict_is_rejected() {
    let store = memory_store();
    store.put("players", &player("p1", 1)).unwrap();
    let clash = Record::new(RecordKey::single("p2").unwrap())
        .with_field("name", "name-p1")
        .with_field("balance", 2_i64);
    assert!(matches!(store.put("players", &clash), Err(StoreError::Backend(_))));
    assert_eq!(store.get("players", &RecordKey::single("p1").unwrap()).unwrap(), player("p1", 1));
}

/// Tests schema violations and unknown collections.
#[test]
fn invalid_records_and_collections_are_rejected() {
    let store = memory_store();
    let missing = Record::new(RecordKey::single("p1").unwrap()).with_field("name", "x");
    assert!(matches!(store.put("players", &missing), Err(StoreError::Schema(_))));
    assert!(matches!(
        store.get("guilds", &RecordKey::single("g").unwrap()),
        Err(StoreError::UnknownCollection(name)) if name == "guilds"
    ));
}

// ============================================================================
// SECTION: Listing
// ============================================================================

/// Tests keyset paging, filters, and restartability.
#[test]
fn list_pages_in_storage_order_with_filters() {
    let store = memory_store();
    for (key, balance) in [("p4", 40), ("p1", 10), ("p3", 30), ("p5", 50), ("p2", 20)] {
        store.put("players", &player(key, balance)).unwrap();
    }
    assert_eq!(listed(&store, Filter::all(), 2), vec!["p1", "p2", "p3", "p4", "p5"]);
    let range = Filter::all().where_gte("balance", 20_i64).where_lt("balance", 50_i64);
    assert_eq!(listed(&store, range.clone(), 1), vec!["p2", "p3", "p4"]);
    assert_eq!(listed(&store, range.clone(), 1), vec!["p2", "p3", "p4"]);
    assert_eq!(store.count("players", &range).unwrap(), 3);
    let eq = Filter::all().where_eq("name", "name-p3");
    assert_eq!(keys(&store.list_page("players", &eq, None, 10).unwrap()), vec!["p3"]);
    let after = store.list_page("players", &Filter::all().where_gte(KEY_FIELD, "p2"), Some("p3"), 10).unwrap();
    assert_eq!(keys(&after), vec!["p4", "p5"]);
}

/// Tests that filters on unindexed fields are rejected.
#[test]
fn unindexed_filter_is_rejected() {
    let store = memory_store();
    let filter = Filter::all().where_eq("vip", true);
    assert!(matches!(store.list_page("players", &filter, None, 10), Err(StoreError::InvalidFilter(_))));
    assert!(matches!(store.count("players", &filter), Err(StoreError::InvalidFilter(_))));
}

// ============================================================================
// SECTION: Batches
// ============================================================================

/// Tests that a batch upsert writes every record and replaces existing ones.
#[test]
fn put_all_writes_every_record() {
    let store = memory_store();
    store.put("players", &player("p1", 1).with_field("vip", true)).unwrap();
    let batch = vec![player("p1", 10), player("p2", 20), player("p3", 30)];
    store.put_all("players", &batch).unwrap();
    assert_eq!(listed(&store, Filter::all(), 2), vec!["p1", "p2", "p3"]);
    assert_eq!(store.get("players", &RecordKey::single("p1").unwrap()).unwrap(), player("p1", 10));
    store.put_all("players", &[]).unwrap();
    assert_eq!(store.count("players", &Filter::all()).unwrap(), 3);
}

/// Tests that a unique index violation mid-batch leaves nothing written.
#[test]
fn put_all_unique_violation_writes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("players.db");
    let store = open(&path, &[players()]).unwrap();
    store.put("players", &player("p0", 0)).unwrap();
    let clash = Record::new(RecordKey::single("p3").unwrap())
        .with_field("name", "name-p1")
        .with_field("balance", 3_i64);
    let batch = vec![player("p1", 1), player("p2", 2), clash, player("p4", 4)];
    assert!(matches!(store.put_all("players", &batch), Err(StoreError::Backend(_))));
    assert_eq!(store.count("players", &Filter::all()).unwrap(), 1);
    assert!(!store.exists("players", &RecordKey::single("p1").unwrap()).unwrap());
    store.disconnect().unwrap();

    let reopened = open(&path, &[players()]).unwrap();
    assert_eq!(listed(&reopened, Filter::all(), 10), vec!["p0"]);
}

/// Tests that a schema violation fails the batch before any write.
#[test]
fn put_all_schema_violation_writes_nothing() {
    let store = memory_store();
    let invalid = Record::new(RecordKey::single("p2").unwrap()).with_field("name", "x");
    let batch = vec![player("p1", 1), invalid];
    assert!(matches!(store.put_all("players", &batch), Err(StoreError::Schema(_))));
    assert_eq!(store.count("players", &Filter::all()).unwrap(), 0);
}

/// Tests that a batch delete removes every key and rolls back on a missing one.
#[test]
fn delete_all_is_atomic() {
    let store = memory_store();
    store.put_all("players", &[player("p1", 1), player("p2", 2), player("p3", 3)]).unwrap();
    let missing = RecordKey::single("ghost").unwrap();
    let keys = vec![RecordKey::single("p1").unwrap(), missing.clone(), RecordKey::single("p2").unwrap()];
    match store.delete_all("players", &keys) {
        Err(StoreError::NotFound {
            key, ..
        }) => assert_eq!(key, missing.storage_id()),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(store.count("players", &Filter::all()).unwrap(), 3);

    store.delete_all("players", &[RecordKey::single("p1").unwrap(), RecordKey::single("p3").unwrap()]).unwrap();
    assert_eq!(listed(&store, Filter::all(), 10), vec!["p2"]);
}

/// Tests that batches on a disconnected store fail as closed.
#[test]
fn batches_fail_after_disconnect() {
    let store = memory_store();
    store.disconnect().unwrap();
    assert!(matches!(store.put_all("players", &[player("p1", 1)]), Err(StoreError::Closed)));
    assert!(matches!(store.delete_all("players", &[]), Err(StoreError::Closed)));
}

// ============================================================================
// SECTION: Schema Reconciliation
// ============================================================================

/// Tests that a new optional field is added to an existing table.
#[test]
fn reconnect_adds_missing_optional_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let v1 = RecordSchema::new("players").field("balance", FieldType::Integer);
    let store = open(&path, &[v1]).unwrap();
    store.put("players", &Record::new(RecordKey::single("p1").unwrap()).with_field("balance", 1_i64)).unwrap();
    store.disconnect().unwrap();

    let v2 = RecordSchema::new("players")
        .field("balance", FieldType::Integer)
        .optional_field("tier", FieldType::String)
        .index("by_tier", &["tier"]);
    let store = open(&path, &[v2]).unwrap();
    let loaded = store.get("players", &RecordKey::single("p1").unwrap()).unwrap();
    assert_eq!(loaded.get("tier"), None);
    let upgraded = loaded.with_field("tier", "gold");
    store.put("players", &upgraded).unwrap();
    assert_eq!(store.count("players", &Filter::all().where_eq("tier", "gold")).unwrap(), 1);
}

/// Tests that a new required field is a schema mismatch.
#[test]
fn reconnect_rejects_missing_required_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    open(&path, &[RecordSchema::new("players").field("balance", FieldType::Integer)]).unwrap();
    let v2 = RecordSchema::new("players").field("balance", FieldType::Integer).field("name", FieldType::String);
    let err = open(&path, &[v2]).err().unwrap();
    assert_eq!(err.kind(), ConnectionErrorKind::SchemaMismatch);
}

/// Tests that an incompatible column type is a schema mismatch.
#[test]
fn incompatible_column_type_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let connection = rusqlite::Connection::open(&path).unwrap();
    connection
        .execute_batch("CREATE TABLE players (\"_key\" TEXT PRIMARY KEY, balance TEXT NOT NULL);")
        .unwrap();
    drop(connection);
    let err = open(&path, &[RecordSchema::new("players").field("balance", FieldType::Integer)]).err().unwrap();
    assert_eq!(err.kind(), ConnectionErrorKind::SchemaMismatch);
    assert!(err.message().contains("balance"));
}

/// Tests that undeclared table columns are ignored.
#[test]
fn undeclared_columns_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let connection = rusqlite::Connection::open(&path).unwrap();
    connection
        .execute_batch(
            "CREATE TABLE players (\"_key\" TEXT PRIMARY KEY, balance INTEGER NOT NULL, legacy TEXT);
             INSERT INTO players VALUES ('p1', 9, 'old');",
        )
        .unwrap();
    drop(connection);
    let store = open(&path, &[RecordSchema::new("players").field("balance", FieldType::Integer)]).unwrap();
    let loaded = store.get("players", &RecordKey::single("p1").unwrap()).unwrap();
    assert_eq!(loaded.get("balance"), Some(&FieldValue::Integer(9)));
    assert!(loaded.extra.is_empty());
}

/// Tests that invalid or duplicated schemas fail to connect.
#[test]
fn invalid_schemas_fail_to_connect() {
    let driver = SqliteDriver::open(&SqliteOptions::in_memory()).unwrap();
    let duplicated = [players(), players()];
    let err = RelationalStore::connect(Box::new(driver), &duplicated).err().unwrap();
    assert_eq!(err.kind(), ConnectionErrorKind::SchemaMismatch);

    let driver = SqliteDriver::open(&SqliteOptions::in_memory()).unwrap();
    let reserved = RecordSchema::new("players").field(KEY_FIELD, FieldType::String);
    let err = RelationalStore::connect(Box::new(driver), &[reserved]).err().unwrap();
    assert_eq!(err.kind(), ConnectionErrorKind::SchemaMismatch);
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

/// Tests health reporting and disconnect.
#[test]
fn disconnect_closes_every_operation() {
    let store = memory_store();
    assert_eq!(store.health_check(Duration::from_secs(5)), HealthStatus::Ok);
    store.disconnect().unwrap();
    store.disconnect().unwrap();
    assert_eq!(store.ping(), Err(StoreError::Closed));
    assert!(matches!(store.health_check(Duration::from_secs(5)), HealthStatus::Down { .. }));
    assert_eq!(store.put("players", &player("p1", 1)), Err(StoreError::Closed));
}

/// Tests that concurrent writers share one store safely.
#[test]
fn concurrent_writers_do_not_lose_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open(&dir.path().join("store.db"), &[players()]).unwrap());
    let handles = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for index in 0..25 {
                    store.put("players", &player(&format!("w{worker}-{index:02}"), index)).unwrap();
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.count("players", &Filter::all()).unwrap(), 100);
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    /// Tests that put then get returns the written record for arbitrary values.
    #[test]
    fn put_get_law_holds(
        key in "[a-z:\\\\]{1,12}",
        name in "\\PC{0,24}",
        balance in any::<i64>(),
        rating in proptest::option::of(-1.0e9_f64..1.0e9),
    ) {
        let store = memory_store();
        let mut record = Record::new(RecordKey::single(key).unwrap())
            .with_field("name", name)
            .with_field("balance", balance);
        if let Some(rating) = rating {
            record = record.with_field("rating", rating);
        }
        store.put("players", &record).unwrap();
        prop_assert_eq!(store.get("players", &record.key).unwrap(), record);
    }
}
