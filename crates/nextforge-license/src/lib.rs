// crates/nextforge-license/src/lib.rs
// ============================================================================
// Module: Nextforge License Gate
// Description: License verification against a remote authority.
// Purpose: Gate provisioning on a granted license.
// Dependencies: nextforge-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! A [`LicenseService`] answers one verification request with a
//! [`LicenseVerdict`]. The [`LicenseGate`] wraps a service with the startup
//! policy: unavailable services are retried with bounded backoff and then
//! fail closed, and a denial is final for the lifetime of the gate.
//!
//! Security posture: the license key is a secret and is never logged or
//! rendered by `Debug`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod gate;
pub mod service;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use gate::LicenseError;
pub use gate::LicenseGate;
pub use gate::LicenseGrant;
pub use service::HttpLicenseService;
pub use service::LicenseKey;
pub use service::LicenseService;
pub use service::LicenseVerdict;
