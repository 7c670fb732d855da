// crates/nextforge-resolver/tests/resolver.rs
// ============================================================================
// Module: Resolver Integration Tests
// Description: End-to-end resolution against scripted repositories.
// Purpose: Validate caching, fallback, retry, and verification behavior.
// Dependencies: nextforge-resolver, nextforge-core, tempfile, tiny_http
// ============================================================================

//! ## Overview
//! Exercises [`nextforge_resolver::Resolver`] against live loopback HTTP
//! servers and local `file://` repositories.

#![allow(dead_code, reason = "Common module may have unused helpers.")]
#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nextforge_core::BackoffPolicy;
use nextforge_core::Cancellation;
use nextforge_core::RecordingSleeper;
use nextforge_resolver::Repository;
use nextforge_resolver::ResolutionError;
use nextforge_resolver::ResolutionErrorKind;
use nextforge_resolver::Resolver;
use nextforge_resolver::ResolverBuilder;
use tempfile::TempDir;

use crate::common::MockRepository;
use crate::common::pinned;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Artifact bytes used throughout.
const JAR: &[u8] = b"PK\x03\x04 driver classes";

/// Returns a builder with default sources and a recording sleeper.
fn builder(cache: &Path, sleeper: &RecordingSleeper) -> ResolverBuilder {
    Resolver::builder(cache)
        .with_default_sources(Duration::from_secs(5), 1024 * 1024)
        .unwrap()
        .backoff(BackoffPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1)))
        .sleeper(Arc::new(sleeper.clone()))
}

/// Returns a repository descriptor for a mock server.
fn repo(id: &str, server: &MockRepository) -> Repository {
    Repository::new(id, server.url()).unwrap()
}

// ============================================================================
// SECTION: Cache Behavior
// ============================================================================

/// Tests a warm cache resolves without touching the network.
#[test]
fn warm_cache_resolves_without_network() {
    let temp = TempDir::new().unwrap();
    let server = MockRepository::serving(JAR);
    let resolver = builder(temp.path(), &RecordingSleeper::new()).repository(repo("central", &server)).build();
    let coordinate = pinned("org.example:driver:1.0", JAR);

    let first = resolver.resolve(std::slice::from_ref(&coordinate)).unwrap();
    let second = resolver.resolve(std::slice::from_ref(&coordinate)).unwrap();

    assert_eq!(server.hits(), 1);
    assert_eq!(first, second);
    assert_eq!(server.paths(), vec!["/repo/org/example/driver/1.0/driver-1.0.jar".to_string()]);
    let artifact = first.get(coordinate.id()).unwrap();
    assert_eq!(fs::read(artifact.local_path()).unwrap(), JAR);
    assert_eq!(artifact.verified_hash(), coordinate.expected_hash());
}

/// Tests a tampered cache entry is discarded and refetched.
#[test]
fn tampered_cache_entry_is_refetched() {
    let temp = TempDir::new().unwrap();
    let server = MockRepository::start(vec![(200, JAR.to_vec()), (200, JAR.to_vec())]);
    let resolver = builder(temp.path(), &RecordingSleeper::new()).repository(repo("central", &server)).build();
    let coordinate = pinned("org.example:driver:1.0", JAR);

    let artifacts = resolver.resolve(std::slice::from_ref(&coordinate)).unwrap();
    let path = artifacts.paths()[0].to_path_buf();
    fs::write(&path, b"tampered").unwrap();

    let artifacts = resolver.resolve(std::slice::from_ref(&coordinate)).unwrap();
    assert_eq!(server.hits(), 2);
    assert_eq!(fs::read(artifacts.paths()[0]).unwrap(), JAR);
}

/// Tests concurrent resolution of one coordinate fetches once.
#[test]
fn concurrent_resolution_fetches_once() {
    let temp = TempDir::new().unwrap();
    let server = MockRepository::serving(JAR);
    let resolver = Arc::new(builder(temp.path(), &RecordingSleeper::new()).repository(repo("central", &server)).build());
    let coordinate = pinned("org.example:driver:1.0", JAR);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let coordinate = coordinate.clone();
            std::thread::spawn(move || resolver.resolve(&[coordinate]))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().is_ok());
    }
    assert_eq!(server.hits(), 1);
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Tests a hash mismatch is terminal and leaves the cache untouched.
#[test]
fn hash_mismatch_is_terminal() {
    let temp = TempDir::new().unwrap();
    let bad = MockRepository::serving(b"not the pinned bytes");
    let good = MockRepository::serving(JAR);
    let resolver = builder(temp.path(), &RecordingSleeper::new())
        .repository(repo("bad", &bad))
        .repository(repo("good", &good))
        .build();
    let coordinate = pinned("org.example:driver:1.0", JAR);

    let err = resolver.resolve(std::slice::from_ref(&coordinate)).unwrap_err();

    assert_eq!(err.kind(), ResolutionErrorKind::HashMismatch);
    match &err {
        ResolutionError::HashMismatch { repository, expected, .. } => {
            assert_eq!(repository, "bad");
            assert_eq!(expected, &coordinate.expected_hash().to_string());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(good.hits(), 0);
    assert!(!resolver.cache().entry_path(&coordinate).exists());
}

// ============================================================================
// SECTION: Repository Fallback
// ============================================================================

/// Tests not-found falls through to the next repository.
#[test]
fn not_found_falls_back_to_next_repository() {
    let temp = TempDir::new().unwrap();
    let empty = MockRepository::start(Vec::new());
    let good = MockRepository::serving(JAR);
    let sleeper = RecordingSleeper::new();
    let resolver = builder(temp.path(), &sleeper)
        .repository(repo("empty", &empty))
        .repository(repo("good", &good))
        .build();

    resolver.resolve(&[pinned("org.example:driver:1.0", JAR)]).unwrap();

    assert_eq!(empty.hits(), 1);
    assert_eq!(good.hits(), 1);
    assert!(sleeper.delays().is_empty());
}

/// Tests transient failures are retried with doubling backoff.
#[test]
fn transient_failures_retry_with_backoff() {
    let temp = TempDir::new().unwrap();
    let server = MockRepository::start(vec![(503, Vec::new()), (503, Vec::new()), (200, JAR.to_vec())]);
    let sleeper = RecordingSleeper::new();
    let resolver = builder(temp.path(), &sleeper).repository(repo("flaky", &server)).build();

    resolver.resolve(&[pinned("org.example:driver:1.0", JAR)]).unwrap();

    assert_eq!(server.hits(), 3);
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(100), Duration::from_millis(200)]);
}

/// Tests exhausted retries move on to the next repository.
#[test]
fn exhausted_retries_fall_back() {
    let temp = TempDir::new().unwrap();
    let down = MockRepository::start(vec![(502, Vec::new()), (502, Vec::new()), (502, Vec::new())]);
    let good = MockRepository::serving(JAR);
    let resolver = builder(temp.path(), &RecordingSleeper::new())
        .repository(repo("down", &down))
        .repository(repo("good", &good))
        .build();

    resolver.resolve(&[pinned("org.example:driver:1.0", JAR)]).unwrap();

    assert_eq!(down.hits(), 3);
    assert_eq!(good.hits(), 1);
}

/// Tests all repositories missing the artifact reports not-found.
#[test]
fn missing_everywhere_reports_not_found() {
    let temp = TempDir::new().unwrap();
    let first = MockRepository::start(Vec::new());
    let second = MockRepository::start(Vec::new());
    let resolver = builder(temp.path(), &RecordingSleeper::new())
        .repository(repo("first", &first))
        .repository(repo("second", &second))
        .build();

    let err = resolver.resolve(&[pinned("org.example:driver:1.0", JAR)]).unwrap_err();

    assert_eq!(err.kind(), ResolutionErrorKind::NotFound);
    assert_eq!(err.artifact(), "org.example:driver:1.0");
}

/// Tests persistent server errors report a network failure.
#[test]
fn persistent_server_errors_report_network_failure() {
    let temp = TempDir::new().unwrap();
    let server = MockRepository::start(vec![(500, Vec::new()), (500, Vec::new()), (500, Vec::new())]);
    let resolver = builder(temp.path(), &RecordingSleeper::new()).repository(repo("broken", &server)).build();

    let err = resolver.resolve(&[pinned("org.example:driver:1.0", JAR)]).unwrap_err();

    assert_eq!(err.kind(), ResolutionErrorKind::NetworkFailure);
}

/// Tests the pinned repository is tried before the configured list.
#[test]
fn pinned_repository_takes_priority() {
    let temp = TempDir::new().unwrap();
    let configured = MockRepository::serving(JAR);
    let pinned_repo = MockRepository::serving(JAR);
    let resolver = builder(temp.path(), &RecordingSleeper::new()).repository(repo("central", &configured)).build();
    let coordinate = pinned("org.example:driver:1.0", JAR).with_repository(pinned_repo.url());

    resolver.resolve(&[coordinate]).unwrap();

    assert_eq!(pinned_repo.hits(), 1);
    assert_eq!(configured.hits(), 0);
}

// ============================================================================
// SECTION: Ordering and Cancellation
// ============================================================================

/// Tests resolution stops at the first failing coordinate.
#[test]
fn resolution_is_fail_fast() {
    let temp = TempDir::new().unwrap();
    let server = MockRepository::start(Vec::new());
    let resolver = builder(temp.path(), &RecordingSleeper::new()).repository(repo("central", &server)).build();

    let err = resolver
        .resolve(&[pinned("org.example:first:1.0", JAR), pinned("org.example:second:1.0", JAR)])
        .unwrap_err();

    assert_eq!(err.artifact(), "org.example:first:1.0");
    assert_eq!(server.hits(), 1);
}

/// Tests a cancelled resolver issues no requests.
#[test]
fn cancelled_resolution_reports_timeout() {
    let temp = TempDir::new().unwrap();
    let server = MockRepository::serving(JAR);
    let cancellation = Cancellation::new();
    cancellation.cancel();
    let resolver = builder(temp.path(), &RecordingSleeper::new())
        .repository(repo("central", &server))
        .cancellation(cancellation)
        .build();

    let err = resolver.resolve(&[pinned("org.example:driver:1.0", JAR)]).unwrap_err();

    assert_eq!(err.kind(), ResolutionErrorKind::Timeout);
    assert_eq!(server.hits(), 0);
}

/// Tests an empty coordinate list yields an empty verified set.
#[test]
fn empty_request_resolves_to_empty_set() {
    let temp = TempDir::new().unwrap();
    let resolver = builder(temp.path(), &RecordingSleeper::new()).build();
    let artifacts = resolver.resolve(&[]).unwrap();
    assert!(artifacts.is_empty());
    assert!(artifacts.covers(&[]));
}

// ============================================================================
// SECTION: Local Repositories
// ============================================================================

/// Tests file repositories and library directory mirroring.
#[test]
fn file_repository_resolves_and_mirrors() {
    let temp = TempDir::new().unwrap();
    let repo_root = temp.path().join("offline");
    let artifact_dir = repo_root.join("org/example/driver/1.0");
    fs::create_dir_all(&artifact_dir).unwrap();
    fs::write(artifact_dir.join("driver-1.0.jar"), JAR).unwrap();
    let url = url::Url::from_directory_path(&repo_root).unwrap();
    let lib_dir = temp.path().join("lib");
    let resolver = builder(&temp.path().join("cache"), &RecordingSleeper::new())
        .repository(Repository::new("offline", url.as_str()).unwrap())
        .lib_dir(&lib_dir)
        .build();
    let coordinate = pinned("org.example:driver:1.0", JAR);

    let artifacts = resolver.resolve(std::slice::from_ref(&coordinate)).unwrap();

    assert!(artifacts.covers(std::slice::from_ref(&coordinate)));
    let artifact = artifacts.get(coordinate.id()).unwrap();
    assert_eq!(artifact.library_path(), Some(lib_dir.join("driver-1.0.jar").as_path()));
    assert_eq!(fs::read(lib_dir.join("driver-1.0.jar")).unwrap(), JAR);
}
