// crates/nextforge-resolver/src/source/mod.rs
// ============================================================================
// Module: Nextforge Artifact Sources
// Description: Repository descriptors and the artifact fetch trait.
// Purpose: Fetch raw artifact bytes from Maven-layout repositories.
// Dependencies: nextforge-core, url
// ============================================================================

//! ## Overview
//! An [`ArtifactSource`] fetches the bytes of one artifact from one
//! [`Repository`]. Sources never verify hashes; the resolver does that once
//! the bytes are in memory. Fetched payloads are capped at a configurable
//! byte limit so an untrusted repository cannot exhaust memory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use nextforge_core::ArtifactId;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod file;
pub mod http;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default cap on a single artifact download.
pub const DEFAULT_MAX_ARTIFACT_BYTES: usize = 64 * 1024 * 1024;

/// Validates a payload length against a cap.
pub(crate) const fn enforce_max_bytes(actual_bytes: usize, max_bytes: usize) -> Result<(), SourceError> {
    if actual_bytes > max_bytes {
        return Err(SourceError::TooLarge {
            max_bytes,
            actual_bytes,
        });
    }
    Ok(())
}

/// Converts a byte cap into the read limit used with [`std::io::Read::take`].
pub(crate) fn read_limit(max_bytes: usize) -> u64 {
    u64::try_from(max_bytes).map_or(u64::MAX, |limit| limit.saturating_add(1))
}

// ============================================================================
// SECTION: Repositories
// ============================================================================

/// Basic authentication credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password (never logged).
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Remote or local artifact repository.
///
/// # Invariants
/// - `url` always ends with `/` so artifact paths join beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Identifier used in logs and errors.
    id: String,
    /// Base URL.
    url: Url,
    /// Optional basic-auth credentials.
    credentials: Option<Credentials>,
}

impl Repository {
    /// Parses a repository base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidUrl`] when the URL does not parse or
    /// cannot be a base.
    pub fn new(id: impl Into<String>, url: &str) -> Result<Self, SourceError> {
        let mut raw = url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).map_err(|err| SourceError::InvalidUrl(err.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(SourceError::InvalidUrl(format!("{url} cannot be a base url")));
        }
        Ok(Self {
            id: id.into(),
            url,
            credentials: None,
        })
    }

    /// Attaches basic-auth credentials.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Returns the repository identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the base URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the URL scheme.
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Returns the credentials, if any.
    #[must_use]
    pub const fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Returns the URL of an artifact in Maven layout.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidUrl`] when the joined URL is invalid.
    pub fn artifact_url(&self, id: &ArtifactId) -> Result<Url, SourceError> {
        self.url.join(&id.relative_path()).map_err(|err| SourceError::InvalidUrl(err.to_string()))
    }

    /// Returns true when both repositories point at the same base URL.
    #[must_use]
    pub fn same_location(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

// ============================================================================
// SECTION: Source Trait
// ============================================================================

/// Fetches artifact bytes from a repository.
pub trait ArtifactSource: Send + Sync {
    /// Fetches the bytes for `id` from `repository`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the artifact is missing or the fetch fails.
    fn fetch(&self, repository: &Repository, id: &ArtifactId) -> Result<Vec<u8>, SourceError>;
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Artifact fetch errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Repository does not hold the artifact.
    #[error("artifact not found: {0}")]
    NotFound(String),
    /// Connection failure or retryable server response.
    #[error("network failure: {0}")]
    Network(String),
    /// Request exceeded its time limit.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// Payload exceeds the size limit.
    #[error("artifact exceeds size limit: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
    /// Repository or artifact URL is invalid.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// No source handles the repository scheme.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    /// Local I/O failure.
    #[error("io error: {0}")]
    Io(String),
}

impl SourceError {
    /// Returns true when retrying the same repository may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
