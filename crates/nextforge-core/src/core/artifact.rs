// crates/nextforge-core/src/core/artifact.rs
// ============================================================================
// Module: Nextforge Artifact Coordinates
// Description: Immutable coordinates addressing versioned driver artifacts.
// Purpose: Name artifacts, pin their hashes, and derive repository paths.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! An [`ArtifactCoordinate`] identifies a driver binary by `(group, name,
//! version)`, carries the digest the bytes must hash to, and optionally pins
//! the repository it should be fetched from first.
//!
//! Invariants:
//! - Coordinates are immutable once constructed; fields are only readable.
//! - Coordinate segments are validated so derived paths cannot escape a
//!   repository root or cache directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::HashDigest;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a single coordinate segment.
pub const MAX_SEGMENT_LENGTH: usize = 128;

/// File extension used for driver artifacts.
pub const ARTIFACT_EXTENSION: &str = "jar";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when constructing coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    /// Coordinate string is not `group:name:version`.
    #[error("coordinate must be group:name:version, found {0}")]
    Malformed(String),
    /// Segment is empty, too long, or contains disallowed characters.
    #[error("invalid coordinate {segment}: {reason}")]
    InvalidSegment {
        /// Segment name (group, name, or version).
        segment: &'static str,
        /// Rejection reason.
        reason: String,
    },
}

// ============================================================================
// SECTION: Artifact Identity
// ============================================================================

/// Artifact identity without integrity data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArtifactId {
    /// Group identifier, dot separated.
    pub group: String,
    /// Artifact name.
    pub name: String,
    /// Artifact version.
    pub version: String,
}

impl ArtifactId {
    /// Parses and validates a `group:name:version` string.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] when the string is malformed.
    pub fn parse(value: &str) -> Result<Self, CoordinateError> {
        let mut parts = value.trim().split(':');
        let (Some(group), Some(name), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CoordinateError::Malformed(value.to_string()));
        };
        Self::new(group, name, version)
    }

    /// Builds a validated identity.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] when a segment is invalid.
    pub fn new(group: &str, name: &str, version: &str) -> Result<Self, CoordinateError> {
        validate_segment("group", group)?;
        validate_segment("name", name)?;
        validate_segment("version", version)?;
        Ok(Self {
            group: group.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// Returns the artifact file name (`name-version.jar`).
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}-{}.{ARTIFACT_EXTENSION}", self.name, self.version)
    }

    /// Returns the repository-relative path segments for the artifact.
    ///
    /// The group's dots become directory separators, matching the Maven
    /// repository layout.
    #[must_use]
    pub fn path_segments(&self) -> Vec<String> {
        let mut segments: Vec<String> = self.group.split('.').map(str::to_string).collect();
        segments.push(self.name.clone());
        segments.push(self.version.clone());
        segments.push(self.file_name());
        segments
    }

    /// Returns the repository-relative path joined with `/`.
    #[must_use]
    pub fn relative_path(&self) -> String {
        self.path_segments().join("/")
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)
    }
}

// ============================================================================
// SECTION: Artifact Coordinate
// ============================================================================

/// Pinned, immutable artifact coordinate.
///
/// # Invariants
/// - Identity is `(group, name, version)`; two coordinates with the same
///   identity but different hashes address different cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArtifactCoordinate {
    /// Artifact identity.
    id: ArtifactId,
    /// Digest the artifact bytes must match.
    expected_hash: HashDigest,
    /// Repository tried before the configured list, if any.
    repository_url: Option<String>,
}

impl ArtifactCoordinate {
    /// Creates a coordinate with no pinned repository.
    #[must_use]
    pub const fn new(id: ArtifactId, expected_hash: HashDigest) -> Self {
        Self {
            id,
            expected_hash,
            repository_url: None,
        }
    }

    /// Returns a copy of the coordinate pinned to a repository URL.
    #[must_use]
    pub fn with_repository(mut self, repository_url: impl Into<String>) -> Self {
        self.repository_url = Some(repository_url.into());
        self
    }

    /// Returns the artifact identity.
    #[must_use]
    pub const fn id(&self) -> &ArtifactId {
        &self.id
    }

    /// Returns the group identifier.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.id.group
    }

    /// Returns the artifact name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// Returns the artifact version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.id.version
    }

    /// Returns the expected digest.
    #[must_use]
    pub const fn expected_hash(&self) -> &HashDigest {
        &self.expected_hash
    }

    /// Returns the pinned repository URL, if any.
    #[must_use]
    pub fn repository_url(&self) -> Option<&str> {
        self.repository_url.as_deref()
    }
}

impl fmt::Display for ArtifactCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.expected_hash)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates a coordinate segment for path safety.
fn validate_segment(segment: &'static str, value: &str) -> Result<(), CoordinateError> {
    let invalid = |reason: &str| CoordinateError::InvalidSegment {
        segment,
        reason: reason.to_string(),
    };
    if value.is_empty() {
        return Err(invalid("must be non-empty"));
    }
    if value.len() > MAX_SEGMENT_LENGTH {
        return Err(invalid("exceeds max length"));
    }
    if !value.bytes().all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-' | b'_'))
    {
        return Err(invalid("must contain only [A-Za-z0-9._-]"));
    }
    if value.starts_with('.') || value.ends_with('.') || value.contains("..") {
        return Err(invalid("must not contain empty or relative path parts"));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
