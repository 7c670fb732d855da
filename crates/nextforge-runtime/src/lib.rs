// crates/nextforge-runtime/src/lib.rs
// ============================================================================
// Module: Nextforge Runtime
// Description: Backend registry, store handles, and startup provisioning.
// Purpose: Turn validated configuration into one connected record store.
// Dependencies: nextforge-config, nextforge-core, nextforge-license,
//               nextforge-resolver, store crates
// ============================================================================

//! ## Overview
//! [`Provisioner`] drives the startup sequence: license gate, artifact
//! resolution, store connection. The [`registry`] maps backend ids to their
//! artifact requirements, option schemas, and factories; the resulting
//! [`StoreHandle`] owns the connected store for the rest of the process.
//!
//! Every fatal failure is a [`ProvisionError`] whose [`ProvisionCategory`]
//! carries a distinct exit code.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod handle;
pub mod provision;
pub mod registry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use handle::StoreHandle;
pub use provision::ProvisionCategory;
pub use provision::ProvisionError;
pub use provision::ProvisionPlan;
pub use provision::Provisioner;
pub use provision::build_resolver;
pub use provision::resolve_backend_artifacts;
pub use registry::BackendDescriptor;
pub use registry::BackendError;
pub use registry::BackendFamily;
pub use registry::BackendRegistry;
pub use registry::OptionDefault;
pub use registry::OptionKind;
pub use registry::OptionSpec;
pub use registry::OptionValue;
pub use registry::UnknownBackendError;
pub use registry::ValidatedOptions;
pub use registry::lookup;
pub use registry::registry;
