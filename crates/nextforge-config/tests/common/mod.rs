// crates/nextforge-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for nextforge-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use nextforge_config::ConfigError;
use nextforge_config::NextforgeConfig;

/// Result alias used by config tests.
pub type TestResult = Result<(), String>;

/// Valid SHA-256 digest used in pins.
pub const SAMPLE_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Minimal valid configuration text.
pub const MINIMAL_TOML: &str = r#"
[license]
key = "NF-TEST-KEY"
endpoint = "https://license.example/verify"

[backend]
id = "json"
options = { directory = "data" }
"#;

/// Parses a TOML string into a `NextforgeConfig` for tests without validation.
pub fn config_from_toml(toml_str: &str) -> Result<NextforgeConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns a minimal config with all defaults applied.
pub fn minimal_config() -> Result<NextforgeConfig, toml::de::Error> {
    config_from_toml(MINIMAL_TOML)
}

/// Asserts that validation failed with a message containing `needle`.
pub fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}
