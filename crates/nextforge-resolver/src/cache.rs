// crates/nextforge-resolver/src/cache.rs
// ============================================================================
// Module: Nextforge Artifact Cache
// Description: Content-addressed local cache of verified artifacts.
// Purpose: Skip network fetches for artifacts that still verify on disk.
// Dependencies: nextforge-core, tempfile, tracing
// ============================================================================

//! ## Overview
//! Entries live at
//! `<root>/<group path>/<name>/<version>/<sha256>/<name>-<version>.jar`.
//! Only bytes that already matched their pin are ever stored, and every
//! lookup re-hashes the file so a tampered or truncated entry is detected,
//! removed, and reported as [`CacheLookup::Tampered`].
//!
//! Invariants:
//! - Writes are atomic: bytes go to a temp file in the entry directory, are
//!   synced, then renamed into place. A crash never leaves a partial entry.
//! - Callers serialize work on one coordinate through [`ArtifactCache::lock_for`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use nextforge_core::ArtifactCoordinate;
use nextforge_core::HashDigest;
use nextforge_core::hash_bytes;
use tempfile::NamedTempFile;

// ============================================================================
// SECTION: Lookup Results
// ============================================================================

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Entry exists and matches the pinned hash.
    Hit(PathBuf),
    /// No entry exists.
    Miss,
    /// Entry existed but no longer matched; it has been removed.
    Tampered {
        /// Hash of the bytes found on disk.
        actual: HashDigest,
    },
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Lock key: artifact id plus expected hash.
type LockKey = (String, String);

/// Local artifact cache rooted at a directory.
#[derive(Debug)]
pub struct ArtifactCache {
    /// Cache root directory.
    root: PathBuf,
    /// Per-coordinate locks.
    locks: Mutex<BTreeMap<LockKey, Arc<Mutex<()>>>>,
}

impl ArtifactCache {
    /// Creates a cache rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the lock guarding `coordinate`.
    ///
    /// Two threads resolving the same coordinate share one lock, so at most
    /// one of them fetches and the other observes the cache hit.
    #[must_use]
    pub fn lock_for(&self, coordinate: &ArtifactCoordinate) -> Arc<Mutex<()>> {
        let key = (coordinate.id().to_string(), coordinate.expected_hash().value.clone());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }

    /// Returns the entry directory for a coordinate.
    #[must_use]
    pub fn entry_dir(&self, coordinate: &ArtifactCoordinate) -> PathBuf {
        let mut dir = self.root.clone();
        for segment in coordinate.group().split('.') {
            dir.push(segment);
        }
        dir.push(coordinate.name());
        dir.push(coordinate.version());
        dir.push(&coordinate.expected_hash().value);
        dir
    }

    /// Returns the entry file path for a coordinate.
    #[must_use]
    pub fn entry_path(&self, coordinate: &ArtifactCoordinate) -> PathBuf {
        self.entry_dir(coordinate).join(coordinate.id().file_name())
    }

    /// Looks up and re-verifies a cached entry.
    ///
    /// # Errors
    ///
    /// Returns [`std::io::Error`] when the entry cannot be read or a tampered
    /// entry cannot be removed.
    pub fn lookup(&self, coordinate: &ArtifactCoordinate) -> std::io::Result<CacheLookup> {
        let path = self.entry_path(coordinate);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(CacheLookup::Miss),
            Err(err) => return Err(err),
        };
        let expected = coordinate.expected_hash();
        let actual = hash_bytes(expected.algorithm, &bytes);
        if &actual == expected {
            return Ok(CacheLookup::Hit(path));
        }
        fs::remove_file(&path)?;
        Ok(CacheLookup::Tampered {
            actual,
        })
    }

    /// Stores verified bytes for a coordinate and returns the entry path.
    ///
    /// The caller must have verified `bytes` against the coordinate's hash.
    ///
    /// # Errors
    ///
    /// Returns [`std::io::Error`] when the entry cannot be written.
    pub fn store(&self, coordinate: &ArtifactCoordinate, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let dir = self.entry_dir(coordinate);
        let path = dir.join(coordinate.id().file_name());
        atomic_write(&dir, &path, bytes)?;
        Ok(path)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes bytes to `target` atomically via a synced temp file in `dir`.
fn atomic_write(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|err| err.error)?;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
