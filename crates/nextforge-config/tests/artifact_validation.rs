//! Artifact config validation tests for nextforge-config.
// crates/nextforge-config/tests/artifact_validation.rs
// =============================================================================
// Module: Artifact Config Validation Tests
// Description: Validate repositories, credentials, and hash pins.
// Purpose: Ensure artifact resolution inputs are unambiguous and well-formed.
// =============================================================================

use nextforge_config::ArtifactPin;
use nextforge_config::RepositoryConfig;
use nextforge_core::ArtifactId;

mod common;

use common::SAMPLE_SHA256;
use common::TestResult;

fn repository(id: &str, url: &str) -> RepositoryConfig {
    RepositoryConfig {
        id: id.to_string(),
        url: url.to_string(),
        username: None,
        password: None,
    }
}

fn pin(coordinate: &str, sha256: &str) -> ArtifactPin {
    ArtifactPin {
        coordinate: coordinate.to_string(),
        sha256: sha256.to_string(),
        repository: None,
    }
}

#[test]
fn repository_ids_must_be_unique() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.artifacts.repositories = vec![
        repository("central", "https://repo1.example/maven2"),
        repository("central", "https://repo2.example/maven2"),
    ];
    common::assert_invalid(config.validate(), "duplicate repository id: central")
}

#[test]
fn repository_scheme_must_be_supported() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.artifacts.repositories = vec![repository("s3", "s3://bucket/maven")];
    common::assert_invalid(config.validate(), "unsupported scheme s3")
}

#[test]
fn repository_credentials_come_in_pairs() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    let mut private = repository("private", "https://repo.example/private");
    private.username = Some("deploy".to_string());
    config.artifacts.repositories = vec![private];
    common::assert_invalid(config.validate(), "must be set together")
}

#[test]
fn file_repositories_accept_local_paths() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.artifacts.repositories = vec![repository("local", "file:///var/lib/m2/repository")];
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn pins_require_valid_digests() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.artifacts.pins = vec![pin("com.h2database:h2:2.2.224", "abc")];
    common::assert_invalid(config.validate(), "artifacts.pins.sha256")
}

#[test]
fn pins_require_valid_coordinates() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.artifacts.pins = vec![pin("com.h2database:h2", SAMPLE_SHA256)];
    common::assert_invalid(config.validate(), "artifacts.pins.coordinate")
}

#[test]
fn duplicate_pins_are_rejected() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.artifacts.pins = vec![
        pin("com.h2database:h2:2.2.224", SAMPLE_SHA256),
        pin("com.h2database:h2:2.2.224", SAMPLE_SHA256),
    ];
    common::assert_invalid(config.validate(), "duplicate pin")
}

#[test]
fn pinned_lookup_returns_coordinate_with_repository() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    let mut h2 = pin("com.h2database:h2:2.2.224", SAMPLE_SHA256);
    h2.repository = Some("https://mirror.example/maven2".to_string());
    config.artifacts.pins = vec![h2];
    config.validate().map_err(|err| err.to_string())?;
    let id = ArtifactId::parse("com.h2database:h2:2.2.224").map_err(|err| err.to_string())?;
    let coordinate = config.artifacts.pinned(&id).map_err(|err| err.to_string())?;
    if coordinate.repository_url() != Some("https://mirror.example/maven2") {
        return Err("pinned repository missing".to_string());
    }
    let missing = ArtifactId::parse("org.mongodb:bson:4.11.1").map_err(|err| err.to_string())?;
    common::assert_invalid(config.artifacts.pinned(&missing).map(|_| ()), "missing sha256 pin")
}

#[test]
fn extra_artifacts_are_validated() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.backend.extra_artifacts = vec![pin("org.example:codec:1.0", "not-a-digest")];
    common::assert_invalid(config.validate(), "backend.extra_artifacts.sha256")
}
