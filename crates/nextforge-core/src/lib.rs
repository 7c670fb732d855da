// crates/nextforge-core/src/lib.rs
// ============================================================================
// Module: Nextforge Core Library
// Description: Public API surface for the Nextforge core.
// Purpose: Expose record, schema, serialization, and store interface types.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Nextforge core defines the backend-agnostic pieces of the provisioning and
//! persistence layer: artifact coordinates and content hashes, the shared
//! record model and schema description, the filter language, the
//! serialization layer translating records into row or document form, and
//! the [`RecordStore`] contract implemented by every backend family.
//!
//! The core performs no I/O. Backends live in their own crates and depend on
//! this one.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::ConnectionError;
pub use interfaces::ConnectionErrorKind;
pub use interfaces::DEFAULT_PAGE_SIZE;
pub use interfaces::HealthStatus;
pub use interfaces::RecordCursor;
pub use interfaces::RecordStore;
pub use interfaces::StoreError;
