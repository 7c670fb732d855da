// crates/nextforge-core/src/core/mod.rs
// ============================================================================
// Module: Nextforge Core Types
// Description: Canonical artifact, record, schema, and filter structures.
// Purpose: Provide stable types shared by the resolver, stores, and runtime.
// Dependencies: serde, sha2, time
// ============================================================================

//! ## Overview
//! Core types are the single source of truth for how artifacts are addressed
//! and verified and how records are shaped, filtered, and serialized. Both
//! backend families consume the same definitions so that equivalent
//! operations yield the same logical results.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod artifact;
pub mod backoff;
pub mod filter;
pub mod hashing;
pub mod record;
pub mod schema;
pub mod serialization;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use artifact::ArtifactCoordinate;
pub use artifact::ArtifactId;
pub use artifact::CoordinateError;
pub use backoff::BackoffPolicy;
pub use backoff::Cancellation;
pub use backoff::RecordingSleeper;
pub use backoff::Sleeper;
pub use backoff::ThreadSleeper;
pub use filter::ComparisonOp;
pub use filter::Filter;
pub use filter::FilterError;
pub use filter::Predicate;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::hash_bytes;
pub use record::FieldValue;
pub use record::KEY_FIELD;
pub use record::KeyError;
pub use record::Record;
pub use record::RecordKey;
pub use record::Timestamp;
pub use schema::FieldSpec;
pub use schema::FieldType;
pub use schema::IndexSpec;
pub use schema::RecordSchema;
pub use schema::SchemaDefinitionError;
pub use schema::SchemaError;
pub use serialization::BackendKind;
pub use serialization::DOCUMENT_ID_FIELD;
pub use serialization::DocValue;
pub use serialization::JSON_DATE_KEY;
pub use serialization::Document;
pub use serialization::Row;
pub use serialization::SqlValue;
pub use serialization::StorageForm;
pub use serialization::from_storage_form;
pub use serialization::to_storage_form;
