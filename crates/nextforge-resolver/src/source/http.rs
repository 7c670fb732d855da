// crates/nextforge-resolver/src/source/http.rs
// ============================================================================
// Module: Nextforge HTTP Artifact Source
// Description: HTTP(S) fetch of Maven-layout artifacts.
// Purpose: Download artifact bytes with status mapping and size limits.
// Dependencies: reqwest, url
// ============================================================================

//! ## Overview
//! [`HttpSource`] issues one blocking GET per fetch. Status codes map onto
//! [`SourceError`] so the resolver can tell "try the next mirror" apart from
//! "retry this one":
//! - 404 and 410 are [`SourceError::NotFound`].
//! - 408, 429, and 5xx are [`SourceError::Network`].
//! - Any other 4xx is [`SourceError::NotFound`].
//!
//! Invariants:
//! - Redirects are rejected.
//! - Payload bytes are capped at the configured maximum.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::time::Duration;

use nextforge_core::ArtifactId;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;

use crate::source::ArtifactSource;
use crate::source::DEFAULT_MAX_ARTIFACT_BYTES;
use crate::source::Repository;
use crate::source::SourceError;
use crate::source::enforce_max_bytes;
use crate::source::read_limit;

// ============================================================================
// SECTION: HTTP Source
// ============================================================================

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP-backed artifact source.
#[derive(Debug, Clone)]
pub struct HttpSource {
    /// Blocking client with redirects disabled.
    client: Client,
    /// Maximum accepted payload size.
    max_bytes: usize,
}

impl HttpSource {
    /// Creates a source with default timeout and size limit.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Network`] when the HTTP client cannot be built.
    pub fn new() -> Result<Self, SourceError> {
        Self::with_limits(DEFAULT_REQUEST_TIMEOUT, DEFAULT_MAX_ARTIFACT_BYTES)
    }

    /// Creates a source with an explicit request timeout and size limit.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Network`] when the HTTP client cannot be built.
    pub fn with_limits(timeout: Duration, max_bytes: usize) -> Result<Self, SourceError> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|err| SourceError::Network(err.to_string()))?;
        Ok(Self {
            client,
            max_bytes,
        })
    }
}

impl ArtifactSource for HttpSource {
    fn fetch(&self, repository: &Repository, id: &ArtifactId) -> Result<Vec<u8>, SourceError> {
        let url = repository.artifact_url(id)?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(SourceError::UnsupportedScheme(scheme.to_string())),
        }
        let mut request = self.client.get(url.clone());
        if let Some(credentials) = repository.credentials() {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        let response = request.send().map_err(|err| map_transport_error(&err))?;
        if response.url() != &url {
            return Err(SourceError::Network("redirect not allowed".to_string()));
        }
        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, id));
        }
        if let Some(length) = response.content_length() {
            let actual_bytes = usize::try_from(length).unwrap_or(usize::MAX);
            enforce_max_bytes(actual_bytes, self.max_bytes)?;
        }
        let mut limited = response.take(read_limit(self.max_bytes));
        let mut bytes = Vec::new();
        limited.read_to_end(&mut bytes).map_err(|err| SourceError::Network(err.to_string()))?;
        enforce_max_bytes(bytes.len(), self.max_bytes)?;
        Ok(bytes)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a reqwest transport error.
fn map_transport_error(err: &reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout(err.to_string())
    } else {
        SourceError::Network(err.to_string())
    }
}

/// Maps a non-success status code.
fn map_status(status: StatusCode, id: &ArtifactId) -> SourceError {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            SourceError::Network(format!("http status {status} for {id}"))
        }
        _ if status.is_server_error() => SourceError::Network(format!("http status {status} for {id}")),
        // 3xx lands here too: redirects are disabled, so the artifact is not at this URL.
        _ => SourceError::NotFound(format!("http status {status} for {id}")),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
