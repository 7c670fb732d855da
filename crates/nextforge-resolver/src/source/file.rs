// crates/nextforge-resolver/src/source/file.rs
// ============================================================================
// Module: Nextforge File Artifact Source
// Description: Local-directory repositories in Maven layout.
// Purpose: Serve artifacts from `file://` repositories such as offline mirrors.
// Dependencies: url
// ============================================================================

//! ## Overview
//! [`FileSource`] reads `<root>/<group path>/<name>/<version>/<file>` for
//! `file://` repositories. Missing files map to [`SourceError::NotFound`]
//! so the resolver falls through to the next repository.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::ErrorKind;
use std::io::Read;

use nextforge_core::ArtifactId;

use crate::source::ArtifactSource;
use crate::source::DEFAULT_MAX_ARTIFACT_BYTES;
use crate::source::Repository;
use crate::source::SourceError;
use crate::source::enforce_max_bytes;
use crate::source::read_limit;

// ============================================================================
// SECTION: File Source
// ============================================================================

/// Artifact source for `file://` repositories.
#[derive(Debug, Clone, Copy)]
pub struct FileSource {
    /// Maximum accepted artifact size.
    max_bytes: usize,
}

impl Default for FileSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSource {
    /// Creates a source with the default size limit.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
        }
    }

    /// Creates a source with an explicit size limit.
    #[must_use]
    pub const fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes,
        }
    }
}

impl ArtifactSource for FileSource {
    fn fetch(&self, repository: &Repository, id: &ArtifactId) -> Result<Vec<u8>, SourceError> {
        let url = repository.artifact_url(id)?;
        if url.scheme() != "file" {
            return Err(SourceError::UnsupportedScheme(url.scheme().to_string()));
        }
        let path = url
            .to_file_path()
            .map_err(|()| SourceError::InvalidUrl(format!("not a local path: {url}")))?;
        let file = File::open(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => SourceError::NotFound(path.display().to_string()),
            _ => SourceError::Io(err.to_string()),
        })?;
        let metadata = file.metadata().map_err(|err| SourceError::Io(err.to_string()))?;
        if !metadata.is_file() {
            return Err(SourceError::NotFound(path.display().to_string()));
        }
        let actual_bytes = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        enforce_max_bytes(actual_bytes, self.max_bytes)?;
        let mut bytes = Vec::new();
        file.take(read_limit(self.max_bytes))
            .read_to_end(&mut bytes)
            .map_err(|err| SourceError::Io(err.to_string()))?;
        enforce_max_bytes(bytes.len(), self.max_bytes)?;
        Ok(bytes)
    }
}
