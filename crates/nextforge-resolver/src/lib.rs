// crates/nextforge-resolver/src/lib.rs
// ============================================================================
// Module: Nextforge Artifact Resolver
// Description: Fetches, verifies, and caches backend driver artifacts.
// Purpose: Produce verified artifact sets before any store is constructed.
// Dependencies: nextforge-core, reqwest, tempfile, url
// ============================================================================

//! ## Overview
//! The resolver turns an ordered list of pinned [`ArtifactCoordinate`]s into
//! [`VerifiedArtifacts`]. Each coordinate is served from the local cache
//! when a re-hashed entry still matches, otherwise fetched from repositories
//! in priority order, hashed, and only then written to the cache.
//!
//! Invariants:
//! - A [`ResolvedArtifact`] always matches its coordinate's expected hash.
//! - Resolution is fail-fast: the first failure aborts remaining work.
//! - A hash mismatch is terminal and never falls back to another mirror.
//!
//! Security posture: repository content is untrusted; see
//! [`source`] for fetch limits.
//!
//! [`ArtifactCoordinate`]: nextforge_core::ArtifactCoordinate

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod mirror;
pub mod resolver;
pub mod source;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::ArtifactCache;
pub use cache::CacheLookup;
pub use resolver::ResolutionError;
pub use resolver::ResolutionErrorKind;
pub use resolver::ResolvedArtifact;
pub use resolver::Resolver;
pub use resolver::ResolverBuilder;
pub use resolver::VerifiedArtifacts;
pub use source::ArtifactSource;
pub use source::Credentials;
pub use source::Repository;
pub use source::SourceError;
pub use source::file::FileSource;
pub use source::http::HttpSource;
