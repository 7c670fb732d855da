// crates/nextforge-resolver/src/resolver.rs
// ============================================================================
// Module: Nextforge Resolver
// Description: Sequential, fail-fast resolution of pinned artifacts.
// Purpose: Turn pinned coordinates into a verified artifact set.
// Dependencies: nextforge-core, tracing
// ============================================================================

//! ## Overview
//! [`Resolver::resolve`] processes coordinates strictly in order. For each
//! one it consults the cache, and on a miss walks the repositories in
//! priority order: the coordinate's pinned repository first, then the
//! configured list. Within one repository, transient failures are retried
//! with bounded backoff; `NotFound` or exhausted retries move on to the
//! next repository. The first repository that returns bytes decides the
//! outcome: matching bytes are cached, anything else is a terminal
//! [`ResolutionError::HashMismatch`] and the bytes are discarded.
//!
//! Invariants:
//! - [`ResolvedArtifact`] and [`VerifiedArtifacts`] are only built here.
//! - Cancellation is checked before every network attempt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::PoisonError;
use std::time::Duration;

use nextforge_core::ArtifactCoordinate;
use nextforge_core::ArtifactId;
use nextforge_core::BackoffPolicy;
use nextforge_core::Cancellation;
use nextforge_core::HashDigest;
use nextforge_core::Sleeper;
use nextforge_core::ThreadSleeper;
use nextforge_core::hash_bytes;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::cache::ArtifactCache;
use crate::cache::CacheLookup;
use crate::mirror::mirror_into;
use crate::source::ArtifactSource;
use crate::source::Repository;
use crate::source::SourceError;
use crate::source::file::FileSource;
use crate::source::http::HttpSource;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Stable category of a resolution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionErrorKind {
    /// No repository holds the artifact.
    NotFound,
    /// Repositories were unreachable or kept failing.
    NetworkFailure,
    /// Fetched bytes did not match the pinned hash.
    HashMismatch,
    /// Requests timed out or resolution was cancelled.
    Timeout,
    /// The local cache could not be read or written.
    Cache,
}

impl ResolutionErrorKind {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NetworkFailure => "network_failure",
            Self::HashMismatch => "hash_mismatch",
            Self::Timeout => "timeout",
            Self::Cache => "cache",
        }
    }
}

/// Resolution failure for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// No repository holds the artifact.
    #[error("artifact {artifact} not found: {detail}")]
    NotFound {
        /// Artifact id.
        artifact: String,
        /// Last repository response.
        detail: String,
    },
    /// Repositories were unreachable.
    #[error("network failure resolving {artifact}: {detail}")]
    NetworkFailure {
        /// Artifact id.
        artifact: String,
        /// Last failure.
        detail: String,
    },
    /// Fetched bytes did not match the pin.
    #[error("hash mismatch for {artifact} from {repository} (expected {expected}, got {actual})")]
    HashMismatch {
        /// Artifact id.
        artifact: String,
        /// Repository that served the bytes.
        repository: String,
        /// Pinned hash.
        expected: String,
        /// Hash of the fetched bytes.
        actual: String,
    },
    /// Requests timed out or resolution was cancelled.
    #[error("timed out resolving {artifact}: {detail}")]
    Timeout {
        /// Artifact id.
        artifact: String,
        /// Failure detail.
        detail: String,
    },
    /// Cache I/O failure.
    #[error("artifact cache failure for {artifact}: {detail}")]
    Cache {
        /// Artifact id.
        artifact: String,
        /// Failure detail.
        detail: String,
    },
}

impl ResolutionError {
    /// Returns the failure category.
    #[must_use]
    pub const fn kind(&self) -> ResolutionErrorKind {
        match self {
            Self::NotFound { .. } => ResolutionErrorKind::NotFound,
            Self::NetworkFailure { .. } => ResolutionErrorKind::NetworkFailure,
            Self::HashMismatch { .. } => ResolutionErrorKind::HashMismatch,
            Self::Timeout { .. } => ResolutionErrorKind::Timeout,
            Self::Cache { .. } => ResolutionErrorKind::Cache,
        }
    }

    /// Returns the artifact the failure belongs to.
    #[must_use]
    pub fn artifact(&self) -> &str {
        match self {
            Self::NotFound { artifact, .. }
            | Self::NetworkFailure { artifact, .. }
            | Self::HashMismatch { artifact, .. }
            | Self::Timeout { artifact, .. }
            | Self::Cache { artifact, .. } => artifact,
        }
    }

    /// Builds a cache error.
    fn cache(id: &ArtifactId, err: &std::io::Error) -> Self {
        Self::Cache {
            artifact: id.to_string(),
            detail: err.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Resolved Artifacts
// ============================================================================

/// Artifact whose local bytes matched the pinned hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    /// Coordinate that was resolved.
    coordinate: ArtifactCoordinate,
    /// Path of the verified cache entry.
    local_path: PathBuf,
    /// Hash computed over the local bytes.
    verified_hash: HashDigest,
    /// Mirror in the library directory, when configured.
    library_path: Option<PathBuf>,
}

impl ResolvedArtifact {
    /// Returns the resolved coordinate.
    #[must_use]
    pub const fn coordinate(&self) -> &ArtifactCoordinate {
        &self.coordinate
    }

    /// Returns the verified cache path.
    #[must_use]
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Returns the verified hash.
    #[must_use]
    pub const fn verified_hash(&self) -> &HashDigest {
        &self.verified_hash
    }

    /// Returns the library directory mirror, if any.
    #[must_use]
    pub fn library_path(&self) -> Option<&Path> {
        self.library_path.as_deref()
    }
}

/// Ordered set of verified artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtifacts {
    /// Artifacts in resolution order.
    artifacts: Vec<ResolvedArtifact>,
}

impl VerifiedArtifacts {
    /// Returns the artifacts in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedArtifact> {
        self.artifacts.iter()
    }

    /// Returns the number of artifacts.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true when the set is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Returns the artifact for an id.
    #[must_use]
    pub fn get(&self, id: &ArtifactId) -> Option<&ResolvedArtifact> {
        self.artifacts.iter().find(|artifact| artifact.coordinate.id() == id)
    }

    /// Returns true when every coordinate is present with the same pin.
    #[must_use]
    pub fn covers(&self, required: &[ArtifactCoordinate]) -> bool {
        required.iter().all(|coordinate| {
            self.get(coordinate.id())
                .is_some_and(|artifact| artifact.verified_hash == *coordinate.expected_hash())
        })
    }

    /// Returns the local paths in resolution order.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        self.artifacts.iter().map(ResolvedArtifact::local_path).collect()
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Default attempts per repository.
const DEFAULT_ATTEMPTS_PER_REPOSITORY: u32 = 3;
/// Default first retry delay.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(250);
/// Default retry delay cap.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Builder for a [`Resolver`].
///
/// # Invariants
/// - Source registrations are keyed by scheme; later registrations overwrite earlier ones.
pub struct ResolverBuilder {
    /// Cache root.
    cache_dir: PathBuf,
    /// Configured repositories in priority order.
    repositories: Vec<Repository>,
    /// Sources keyed by URL scheme.
    sources: BTreeMap<String, Arc<dyn ArtifactSource>>,
    /// Per-repository retry policy.
    backoff: BackoffPolicy,
    /// Delay implementation.
    sleeper: Arc<dyn Sleeper>,
    /// Cancellation token checked before each attempt.
    cancellation: Cancellation,
    /// Optional flat library directory.
    lib_dir: Option<PathBuf>,
}

impl ResolverBuilder {
    /// Creates a builder with no repositories or sources.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            repositories: Vec::new(),
            sources: BTreeMap::new(),
            backoff: BackoffPolicy::new(
                DEFAULT_ATTEMPTS_PER_REPOSITORY,
                DEFAULT_INITIAL_BACKOFF,
                DEFAULT_MAX_BACKOFF,
            ),
            sleeper: Arc::new(ThreadSleeper),
            cancellation: Cancellation::new(),
            lib_dir: None,
        }
    }

    /// Registers the HTTP(S) and file sources with the given limits.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the HTTP client cannot be built.
    pub fn with_default_sources(self, request_timeout: Duration, max_bytes: usize) -> Result<Self, SourceError> {
        let http = HttpSource::with_limits(request_timeout, max_bytes)?;
        Ok(self
            .source("http", http.clone())
            .source("https", http)
            .source("file", FileSource::with_max_bytes(max_bytes)))
    }

    /// Registers a source for a URL scheme.
    #[must_use]
    pub fn source(mut self, scheme: impl Into<String>, source: impl ArtifactSource + 'static) -> Self {
        self.sources.insert(scheme.into(), Arc::new(source));
        self
    }

    /// Appends a repository to the priority list.
    #[must_use]
    pub fn repository(mut self, repository: Repository) -> Self {
        self.repositories.push(repository);
        self
    }

    /// Sets the per-repository retry policy.
    #[must_use]
    pub const fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the sleeper used between retries.
    #[must_use]
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Mirrors resolved artifacts into a library directory.
    #[must_use]
    pub fn lib_dir(mut self, lib_dir: impl Into<PathBuf>) -> Self {
        self.lib_dir = Some(lib_dir.into());
        self
    }

    /// Builds the resolver.
    #[must_use]
    pub fn build(self) -> Resolver {
        Resolver {
            cache: ArtifactCache::new(self.cache_dir),
            repositories: self.repositories,
            sources: self.sources,
            backoff: self.backoff,
            sleeper: self.sleeper,
            cancellation: self.cancellation,
            lib_dir: self.lib_dir,
        }
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Bytes returned by the first repository that had the artifact.
struct Fetched {
    /// Repository identifier.
    repository: String,
    /// Raw, unverified bytes.
    bytes: Vec<u8>,
}

/// Resolves pinned coordinates into verified artifacts.
pub struct Resolver {
    /// Local verified cache.
    cache: ArtifactCache,
    /// Configured repositories in priority order.
    repositories: Vec<Repository>,
    /// Sources keyed by URL scheme.
    sources: BTreeMap<String, Arc<dyn ArtifactSource>>,
    /// Per-repository retry policy.
    backoff: BackoffPolicy,
    /// Delay implementation.
    sleeper: Arc<dyn Sleeper>,
    /// Cancellation token.
    cancellation: Cancellation,
    /// Optional flat library directory.
    lib_dir: Option<PathBuf>,
}

impl Resolver {
    /// Returns a builder rooted at `cache_dir`.
    #[must_use]
    pub fn builder(cache_dir: impl Into<PathBuf>) -> ResolverBuilder {
        ResolverBuilder::new(cache_dir)
    }

    /// Returns the artifact cache.
    #[must_use]
    pub const fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Resolves every coordinate in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`ResolutionError`] encountered.
    pub fn resolve(&self, coordinates: &[ArtifactCoordinate]) -> Result<VerifiedArtifacts, ResolutionError> {
        let mut artifacts = Vec::with_capacity(coordinates.len());
        for coordinate in coordinates {
            artifacts.push(self.resolve_one(coordinate)?);
        }
        Ok(VerifiedArtifacts {
            artifacts,
        })
    }

    /// Resolves a single coordinate under its cache lock.
    fn resolve_one(&self, coordinate: &ArtifactCoordinate) -> Result<ResolvedArtifact, ResolutionError> {
        let id = coordinate.id();
        let lock = self.cache.lock_for(coordinate);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        match self.cache.lookup(coordinate).map_err(|err| ResolutionError::cache(id, &err))? {
            CacheLookup::Hit(path) => {
                info!(artifact = %id, path = %path.display(), "artifact cache hit");
                return self.finish(coordinate, path);
            }
            CacheLookup::Tampered { actual } => {
                warn!(
                    artifact = %id,
                    expected = %coordinate.expected_hash(),
                    actual = %actual,
                    "cached artifact failed verification; entry removed, refetching"
                );
            }
            CacheLookup::Miss => {
                debug!(artifact = %id, "artifact cache miss");
            }
        }

        let fetched = self.fetch(coordinate)?;
        let expected = coordinate.expected_hash();
        let actual = hash_bytes(expected.algorithm, &fetched.bytes);
        if &actual != expected {
            warn!(
                artifact = %id,
                repository = %fetched.repository,
                expected = %expected,
                actual = %actual,
                "artifact hash mismatch; bytes discarded"
            );
            return Err(ResolutionError::HashMismatch {
                artifact: id.to_string(),
                repository: fetched.repository,
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        let path = self.cache.store(coordinate, &fetched.bytes).map_err(|err| ResolutionError::cache(id, &err))?;
        info!(
            artifact = %id,
            repository = %fetched.repository,
            bytes = fetched.bytes.len(),
            "artifact fetched and verified"
        );
        self.finish(coordinate, path)
    }

    /// Mirrors a verified entry and builds the resolved artifact.
    fn finish(&self, coordinate: &ArtifactCoordinate, path: PathBuf) -> Result<ResolvedArtifact, ResolutionError> {
        let library_path = match &self.lib_dir {
            Some(lib_dir) => Some(
                mirror_into(lib_dir, &path, &coordinate.id().file_name())
                    .map_err(|err| ResolutionError::cache(coordinate.id(), &err))?,
            ),
            None => None,
        };
        Ok(ResolvedArtifact {
            coordinate: coordinate.clone(),
            local_path: path,
            verified_hash: coordinate.expected_hash().clone(),
            library_path,
        })
    }

    /// Walks repositories in priority order until one returns bytes.
    fn fetch(&self, coordinate: &ArtifactCoordinate) -> Result<Fetched, ResolutionError> {
        let id = coordinate.id();
        let repositories = self.candidates(coordinate)?;
        if repositories.is_empty() {
            return Err(ResolutionError::NotFound {
                artifact: id.to_string(),
                detail: "no repositories configured".to_string(),
            });
        }
        let mut last_failure: Option<SourceError> = None;
        let mut not_found: Option<SourceError> = None;
        for repository in &repositories {
            match self.fetch_from(repository, id) {
                Ok(bytes) => {
                    return Ok(Fetched {
                        repository: repository.id().to_string(),
                        bytes,
                    });
                }
                Err(FetchFailure::Cancelled) => return Err(cancelled(id)),
                Err(FetchFailure::Source(err)) => {
                    debug!(
                        artifact = %id,
                        repository = %repository.id(),
                        error = %err,
                        "repository failed; trying next"
                    );
                    if matches!(err, SourceError::NotFound(_)) {
                        not_found = Some(err);
                    } else {
                        last_failure = Some(err);
                    }
                }
            }
        }
        Err(match (last_failure, not_found) {
            (Some(SourceError::Timeout(detail)), _) => ResolutionError::Timeout {
                artifact: id.to_string(),
                detail,
            },
            (Some(err), _) => ResolutionError::NetworkFailure {
                artifact: id.to_string(),
                detail: err.to_string(),
            },
            (None, Some(err)) => ResolutionError::NotFound {
                artifact: id.to_string(),
                detail: err.to_string(),
            },
            (None, None) => ResolutionError::NotFound {
                artifact: id.to_string(),
                detail: "no repository responded".to_string(),
            },
        })
    }

    /// Fetches from one repository, retrying transient failures.
    fn fetch_from(&self, repository: &Repository, id: &ArtifactId) -> Result<Vec<u8>, FetchFailure> {
        let Some(source) = self.sources.get(repository.scheme()) else {
            return Err(FetchFailure::Source(SourceError::UnsupportedScheme(repository.scheme().to_string())));
        };
        let max_attempts = self.backoff.max_attempts();
        let mut attempt = 1;
        loop {
            if self.cancellation.is_cancelled() {
                return Err(FetchFailure::Cancelled);
            }
            match source.fetch(repository, id) {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff.delay_after(attempt);
                    warn!(
                        artifact = %id,
                        repository = %repository.id(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "artifact fetch failed; retrying"
                    );
                    self.sleeper.sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(FetchFailure::Source(err)),
            }
        }
    }

    /// Returns the repositories to try: pinned first, then configured.
    fn candidates(&self, coordinate: &ArtifactCoordinate) -> Result<Vec<Repository>, ResolutionError> {
        let mut ordered = Vec::with_capacity(self.repositories.len() + 1);
        if let Some(url) = coordinate.repository_url() {
            let pinned = Repository::new("pinned", url).map_err(|err| ResolutionError::NetworkFailure {
                artifact: coordinate.id().to_string(),
                detail: err.to_string(),
            })?;
            let configured = self.repositories.iter().find(|repo| repo.same_location(&pinned));
            ordered.push(configured.cloned().unwrap_or(pinned));
        }
        for repository in &self.repositories {
            if !ordered.iter().any(|seen: &Repository| seen.same_location(repository)) {
                ordered.push(repository.clone());
            }
        }
        Ok(ordered)
    }
}

/// Outcome of a failed repository walk step.
enum FetchFailure {
    /// Cancellation was observed before an attempt.
    Cancelled,
    /// Repository failed after its retries.
    Source(SourceError),
}

/// Builds the error reported when resolution is cancelled.
fn cancelled(id: &ArtifactId) -> ResolutionError {
    ResolutionError::Timeout {
        artifact: id.to_string(),
        detail: "resolution cancelled by provisioning deadline".to_string(),
    }
}
