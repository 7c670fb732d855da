// crates/nextforge-store-document/src/lib.rs
// ============================================================================
// Module: Nextforge Document Store
// Description: Document-form record stores over document drivers.
// Purpose: Implement the record store contract for document backends.
// Dependencies: nextforge-core, serde_json, tempfile, mongodb (feature)
// ============================================================================

//! ## Overview
//! [`DocumentStore`] implements [`nextforge_core::RecordStore`] once for
//! every document engine. Engines plug in through [`DocumentDriver`], which
//! moves [`nextforge_core::Document`] values in and out and evaluates
//! filters natively.
//!
//! Invariants:
//! - Documents are keyed by the `_id` storage id.
//! - Fields the schema does not declare are preserved in `Record::extra`.
//! - Declared indexes exist after connect; an index whose definition
//!   changed is dropped and recreated.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod driver;
pub mod json;
#[cfg(feature = "mongo")]
pub mod mongo;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use driver::DocumentDriver;
pub use driver::DocumentWrite;
pub use driver::DriverError;
pub use json::JsonFileDriver;
pub use json::JsonStoreOptions;
#[cfg(feature = "mongo")]
pub use mongo::MongoDriver;
#[cfg(feature = "mongo")]
pub use mongo::MongoOptions;
pub use store::DocumentStore;
