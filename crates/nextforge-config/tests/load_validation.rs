//! Config loading tests for nextforge-config.
// crates/nextforge-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Tests
// Description: Validate file loading, limits, and section defaults.
// Purpose: Ensure configuration fails closed before provisioning starts.
// =============================================================================

use std::fs;

use nextforge_config::ConfigError;
use nextforge_config::LogFormat;
use nextforge_config::NextforgeConfig;
use tempfile::TempDir;

mod common;

use common::TestResult;

#[test]
fn load_applies_defaults() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("nextforge.toml");
    fs::write(&path, common::MINIMAL_TOML).map_err(|err| err.to_string())?;
    let config = NextforgeConfig::load(Some(&path)).map_err(|err| err.to_string())?;
    if config.license.max_attempts != 5 {
        return Err(format!("unexpected license attempts {}", config.license.max_attempts));
    }
    if config.provisioning.timeout_ms != 120_000 {
        return Err("unexpected provisioning timeout".to_string());
    }
    if config.logging.format != LogFormat::Text || config.logging.level != "info" {
        return Err("unexpected logging defaults".to_string());
    }
    if config.artifacts.cache_dir.to_string_lossy() != ".nextforge-cache" {
        return Err("unexpected cache dir".to_string());
    }
    Ok(())
}

#[test]
fn load_missing_file_reports_io_error() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("absent.toml");
    match NextforgeConfig::load(Some(&path)) {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {other:?}")),
    }
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("big.toml");
    let mut content = common::MINIMAL_TOML.to_string();
    content.push_str(&format!("# {}\n", "x".repeat(1024 * 1024)));
    fs::write(&path, content).map_err(|err| err.to_string())?;
    common::assert_invalid(NextforgeConfig::load(Some(&path)).map(|_| ()), "size limit")
}

#[test]
fn unknown_keys_are_parse_errors() -> TestResult {
    let content = format!("{}\n[unexpected]\nvalue = 1\n", common::MINIMAL_TOML);
    match NextforgeConfig::from_toml_str(&content) {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {other:?}")),
    }
}

#[test]
fn empty_license_key_is_rejected() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.license.key = "   ".to_string();
    common::assert_invalid(config.validate(), "license.key")
}

#[test]
fn license_endpoint_must_be_http() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.license.endpoint = "ftp://license.example".to_string();
    common::assert_invalid(config.validate(), "license.endpoint")
}

#[test]
fn license_attempts_are_bounded() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.license.max_attempts = 0;
    common::assert_invalid(config.validate(), "license.max_attempts")?;
    config.license.max_attempts = 11;
    common::assert_invalid(config.validate(), "license.max_attempts")
}

#[test]
fn provisioning_timeout_is_bounded() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.provisioning.timeout_ms = 10;
    common::assert_invalid(config.validate(), "provisioning.timeout_ms")
}

#[test]
fn log_level_must_be_known() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.logging.level = "loud".to_string();
    common::assert_invalid(config.validate(), "logging.level")
}

#[test]
fn collections_are_validated_and_unique() -> TestResult {
    let content = format!(
        "{}\n{}",
        common::MINIMAL_TOML,
        r#"
[[collections]]
collection = "players"
fields = [
  { name = "name", type = "string" },
  { name = "balance", type = "integer" },
  { name = "tier", type = "string", optional = true },
]
indexes = [{ name = "by_balance", fields = ["balance"] }]

[[collections]]
collection = "players"
"#
    );
    let config = common::config_from_toml(&content).map_err(|err| err.to_string())?;
    if config.collections[0].fields.len() != 3 {
        return Err("collection fields not parsed".to_string());
    }
    common::assert_invalid(config.validate(), "duplicate collection: players")
}
