// crates/nextforge-config/src/lib.rs
// ============================================================================
// Module: Nextforge Config Library
// Description: Canonical config model, loading, and validation for Nextforge.
// Purpose: Single source of truth for provisioning configuration semantics.
// Dependencies: nextforge-core, serde, toml, url
// ============================================================================

//! ## Overview
//! This crate owns the Nextforge configuration model: the license endpoint
//! and key, artifact repositories and hash pins, the selected backend and its
//! options, provisioning deadlines, logging, and declared collection schemas.
//! Loading fails closed; every section is validated before any provisioning
//! step performs network or file I/O.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ArtifactPin;
pub use config::ArtifactsConfig;
pub use config::BackendConfig;
pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::LicenseConfig;
pub use config::LogFormat;
pub use config::LoggingConfig;
pub use config::NextforgeConfig;
pub use config::ProvisioningConfig;
pub use config::RepositoryConfig;
