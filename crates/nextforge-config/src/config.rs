// crates/nextforge-config/src/config.rs
// ============================================================================
// Module: Nextforge Configuration
// Description: Configuration loading and validation for Nextforge.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: nextforge-core, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed: the provisioning pipeline
//! never starts with a config that did not pass [`NextforgeConfig::validate`].
//! Security posture: config inputs are untrusted and carry secrets (license
//! key, repository and store credentials); `Debug` output redacts them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use nextforge_core::ArtifactCoordinate;
use nextforge_core::ArtifactId;
use nextforge_core::HashDigest;
use nextforge_core::RecordSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "nextforge.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "NEXTFORGE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum license key length.
const MAX_LICENSE_KEY_LENGTH: usize = 4096;
/// Maximum configured repositories.
const MAX_REPOSITORIES: usize = 32;
/// Maximum configured pins.
const MAX_PINS: usize = 256;

/// Default license product name.
const DEFAULT_LICENSE_PRODUCT: &str = "nextforge";
/// Default license verification attempts.
const DEFAULT_LICENSE_MAX_ATTEMPTS: u32 = 5;
/// Default first license retry delay in milliseconds.
const DEFAULT_LICENSE_INITIAL_BACKOFF_MS: u64 = 250;
/// Default license retry delay cap in milliseconds.
const DEFAULT_LICENSE_MAX_BACKOFF_MS: u64 = 5_000;
/// Default HTTP request timeout in milliseconds.
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
/// Default artifact cache directory.
const DEFAULT_CACHE_DIR: &str = ".nextforge-cache";
/// Default attempts per repository for transient failures.
const DEFAULT_REPOSITORY_ATTEMPTS: u32 = 3;
/// Default first resolution retry delay in milliseconds.
const DEFAULT_RESOLVE_INITIAL_BACKOFF_MS: u64 = 200;
/// Default resolution retry delay cap in milliseconds.
const DEFAULT_RESOLVE_MAX_BACKOFF_MS: u64 = 2_000;
/// Default artifact request timeout in milliseconds.
const DEFAULT_ARTIFACT_TIMEOUT_MS: u64 = 30_000;
/// Default maximum artifact size in bytes.
const DEFAULT_MAX_ARTIFACT_BYTES: usize = 64 * 1024 * 1024;
/// Hard upper bound for artifact size in bytes.
const MAX_ARTIFACT_BYTES_LIMIT: usize = 512 * 1024 * 1024;
/// Default connect attempts for unreachable stores.
const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;
/// Default first connect retry delay in milliseconds.
const DEFAULT_CONNECT_INITIAL_BACKOFF_MS: u64 = 200;
/// Default connect retry delay cap in milliseconds.
const DEFAULT_CONNECT_MAX_BACKOFF_MS: u64 = 2_000;
/// Default health-check latency threshold in milliseconds.
const DEFAULT_DEGRADED_LATENCY_MS: u64 = 500;
/// Default overall provisioning timeout in milliseconds.
const DEFAULT_PROVISIONING_TIMEOUT_MS: u64 = 120_000;
/// Minimum overall provisioning timeout in milliseconds.
const MIN_PROVISIONING_TIMEOUT_MS: u64 = 1_000;
/// Maximum overall provisioning timeout in milliseconds.
const MAX_PROVISIONING_TIMEOUT_MS: u64 = 600_000;
/// Minimum HTTP request timeout in milliseconds.
const MIN_REQUEST_TIMEOUT_MS: u64 = 100;
/// Maximum HTTP request timeout in milliseconds.
const MAX_REQUEST_TIMEOUT_MS: u64 = 120_000;
/// Minimum backoff in milliseconds.
const MIN_BACKOFF_MS: u64 = 1;
/// Maximum backoff in milliseconds.
const MAX_BACKOFF_MS: u64 = 60_000;
/// Maximum retry attempts for any retry policy.
const MAX_ATTEMPTS: u32 = 10;
/// Accepted log levels.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Nextforge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NextforgeConfig {
    /// License gate configuration.
    pub license: LicenseConfig,
    /// Artifact resolution configuration.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    /// Selected backend configuration.
    pub backend: BackendConfig,
    /// Provisioning deadline configuration.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Declared collection schemas.
    #[serde(default)]
    pub collections: Vec<RecordSchema>,
}

impl NextforgeConfig {
    /// Loads configuration using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::invalid("config", "config file exceeds size limit"));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::invalid("config", "config file must be utf-8"))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.license.validate()?;
        self.artifacts.validate()?;
        self.backend.validate()?;
        self.provisioning.validate()?;
        self.logging.validate()?;
        let mut collections = BTreeSet::new();
        for schema in &self.collections {
            schema
                .validate()
                .map_err(|err| ConfigError::invalid("collections", err.to_string()))?;
            if !collections.insert(schema.collection.as_str()) {
                return Err(ConfigError::invalid(
                    "collections",
                    format!("duplicate collection: {}", schema.collection),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: License Config
// ============================================================================

/// License gate configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LicenseConfig {
    /// License key presented to the license service.
    pub key: String,
    /// License service verification endpoint.
    pub endpoint: String,
    /// Product identifier presented with the key.
    #[serde(default = "default_license_product")]
    pub product: String,
    /// Verification attempts while the service is unavailable.
    #[serde(default = "default_license_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_license_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Retry delay cap in milliseconds.
    #[serde(default = "default_license_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl LicenseConfig {
    /// Validates license settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let key = self.key.trim();
        if key.is_empty() {
            return Err(ConfigError::invalid("license.key", "must be non-empty"));
        }
        if key.len() > MAX_LICENSE_KEY_LENGTH {
            return Err(ConfigError::invalid("license.key", "exceeds max length"));
        }
        validate_http_url("license.endpoint", &self.endpoint)?;
        if self.product.trim().is_empty() {
            return Err(ConfigError::invalid("license.product", "must be non-empty"));
        }
        validate_attempts("license.max_attempts", self.max_attempts)?;
        validate_backoff(
            "license",
            self.initial_backoff_ms,
            self.max_backoff_ms,
        )?;
        validate_timeout_range(
            "license.request_timeout_ms",
            self.request_timeout_ms,
            MIN_REQUEST_TIMEOUT_MS,
            MAX_REQUEST_TIMEOUT_MS,
        )
    }
}

impl fmt::Debug for LicenseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicenseConfig")
            .field("key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("product", &self.product)
            .field("max_attempts", &self.max_attempts)
            .field("initial_backoff_ms", &self.initial_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

// ============================================================================
// SECTION: Artifact Config
// ============================================================================

/// Artifact resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactsConfig {
    /// Local verified-artifact cache directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Optional directory resolved artifacts are mirrored into.
    #[serde(default)]
    pub lib_dir: Option<PathBuf>,
    /// Attempts per repository for transient failures.
    #[serde(default = "default_repository_attempts")]
    pub max_attempts_per_repository: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_resolve_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Retry delay cap in milliseconds.
    #[serde(default = "default_resolve_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_artifact_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Maximum artifact size in bytes.
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: usize,
    /// Repositories in priority order.
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
    /// Hash pins for artifact coordinates.
    #[serde(default)]
    pub pins: Vec<ArtifactPin>,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            lib_dir: None,
            max_attempts_per_repository: DEFAULT_REPOSITORY_ATTEMPTS,
            initial_backoff_ms: DEFAULT_RESOLVE_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_RESOLVE_MAX_BACKOFF_MS,
            request_timeout_ms: DEFAULT_ARTIFACT_TIMEOUT_MS,
            max_artifact_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
            repositories: Vec::new(),
            pins: Vec::new(),
        }
    }
}

impl ArtifactsConfig {
    /// Validates artifact settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_field("artifacts.cache_dir", &self.cache_dir)?;
        if let Some(lib_dir) = &self.lib_dir {
            validate_path_field("artifacts.lib_dir", lib_dir)?;
        }
        validate_attempts("artifacts.max_attempts_per_repository", self.max_attempts_per_repository)?;
        validate_backoff("artifacts", self.initial_backoff_ms, self.max_backoff_ms)?;
        validate_timeout_range(
            "artifacts.request_timeout_ms",
            self.request_timeout_ms,
            MIN_REQUEST_TIMEOUT_MS,
            MAX_REQUEST_TIMEOUT_MS,
        )?;
        if self.max_artifact_bytes == 0 || self.max_artifact_bytes > MAX_ARTIFACT_BYTES_LIMIT {
            return Err(ConfigError::invalid(
                "artifacts.max_artifact_bytes",
                format!("must be between 1 and {MAX_ARTIFACT_BYTES_LIMIT}"),
            ));
        }
        if self.repositories.len() > MAX_REPOSITORIES {
            return Err(ConfigError::invalid("artifacts.repositories", "too many repositories"));
        }
        let mut ids = BTreeSet::new();
        for repository in &self.repositories {
            repository.validate()?;
            if !ids.insert(repository.id.as_str()) {
                return Err(ConfigError::invalid(
                    "artifacts.repositories.id",
                    format!("duplicate repository id: {}", repository.id),
                ));
            }
        }
        if self.pins.len() > MAX_PINS {
            return Err(ConfigError::invalid("artifacts.pins", "too many pins"));
        }
        let mut pinned = BTreeSet::new();
        for pin in &self.pins {
            let coordinate = pin.to_coordinate("artifacts.pins")?;
            if !pinned.insert(coordinate.id().clone()) {
                return Err(ConfigError::invalid(
                    "artifacts.pins.coordinate",
                    format!("duplicate pin: {}", coordinate.id()),
                ));
            }
        }
        Ok(())
    }

    /// Returns the pinned coordinate for an artifact identity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when no pin exists or the pin is malformed.
    pub fn pinned(&self, id: &ArtifactId) -> Result<ArtifactCoordinate, ConfigError> {
        for pin in &self.pins {
            let coordinate = pin.to_coordinate("artifacts.pins")?;
            if coordinate.id() == id {
                return Ok(coordinate);
            }
        }
        Err(ConfigError::invalid("artifacts.pins", format!("missing sha256 pin for {id}")))
    }
}

/// Artifact repository configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Repository identifier used in logs.
    pub id: String,
    /// Repository base URL (`http`, `https`, or `file`).
    pub url: String,
    /// Basic-auth username.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<String>,
}

impl RepositoryConfig {
    /// Validates repository settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() || self.id.trim() != self.id {
            return Err(ConfigError::invalid(
                "artifacts.repositories.id",
                "must be non-empty and trimmed",
            ));
        }
        let url = Url::parse(&self.url).map_err(|err| {
            ConfigError::invalid("artifacts.repositories.url", format!("{}: {err}", self.id))
        })?;
        match url.scheme() {
            "http" | "https" | "file" => {}
            scheme => {
                return Err(ConfigError::invalid(
                    "artifacts.repositories.url",
                    format!("unsupported scheme {scheme} for {}", self.id),
                ));
            }
        }
        match (&self.username, &self.password) {
            (Some(_), Some(_)) | (None, None) => {}
            _ => {
                return Err(ConfigError::invalid(
                    "artifacts.repositories.username",
                    format!("username and password must be set together for {}", self.id),
                ));
            }
        }
        if self.username.is_some() && url.scheme() == "file" {
            return Err(ConfigError::invalid(
                "artifacts.repositories.username",
                format!("credentials are not supported for file repository {}", self.id),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Hash pin for an artifact coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactPin {
    /// Coordinate as `group:name:version`.
    pub coordinate: String,
    /// Expected SHA-256 hex digest.
    pub sha256: String,
    /// Repository URL tried before the configured list.
    #[serde(default)]
    pub repository: Option<String>,
}

impl ArtifactPin {
    /// Builds the pinned coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the coordinate, digest, or repository URL
    /// is invalid.
    pub fn to_coordinate(&self, field: &str) -> Result<ArtifactCoordinate, ConfigError> {
        let id = ArtifactId::parse(&self.coordinate)
            .map_err(|err| ConfigError::invalid(format!("{field}.coordinate"), err.to_string()))?;
        let digest = HashDigest::parse_sha256(&self.sha256).map_err(|err| {
            ConfigError::invalid(format!("{field}.sha256"), format!("{id}: {err}"))
        })?;
        let coordinate = ArtifactCoordinate::new(id, digest);
        match &self.repository {
            Some(repository) => {
                let url = Url::parse(repository).map_err(|err| {
                    ConfigError::invalid(format!("{field}.repository"), err.to_string())
                })?;
                if !matches!(url.scheme(), "http" | "https" | "file") {
                    return Err(ConfigError::invalid(
                        format!("{field}.repository"),
                        format!("unsupported scheme {}", url.scheme()),
                    ));
                }
                Ok(coordinate.with_repository(repository.clone()))
            }
            None => Ok(coordinate),
        }
    }
}

// ============================================================================
// SECTION: Backend Config
// ============================================================================

/// Selected backend configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Backend identifier (`h2`, `mysql`, `mongo`, `json`).
    pub id: String,
    /// Backend options validated against the registry schema.
    #[serde(default)]
    pub options: BTreeMap<String, toml::Value>,
    /// Additional artifacts resolved after the backend's own requirements.
    #[serde(default)]
    pub extra_artifacts: Vec<ArtifactPin>,
    /// Connect attempts while the store is unreachable.
    #[serde(default = "default_connect_attempts")]
    pub connect_max_attempts: u32,
    /// Delay before the first connect retry in milliseconds.
    #[serde(default = "default_connect_initial_backoff_ms")]
    pub connect_initial_backoff_ms: u64,
    /// Connect retry delay cap in milliseconds.
    #[serde(default = "default_connect_max_backoff_ms")]
    pub connect_max_backoff_ms: u64,
    /// Health-check latency above which the store reports degraded.
    #[serde(default = "default_degraded_latency_ms")]
    pub degraded_latency_ms: u64,
}

impl BackendConfig {
    /// Validates backend settings that do not depend on the registry.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::invalid("backend.id", "must be non-empty"));
        }
        for pin in &self.extra_artifacts {
            pin.to_coordinate("backend.extra_artifacts")?;
        }
        validate_attempts("backend.connect_max_attempts", self.connect_max_attempts)?;
        validate_backoff(
            "backend.connect",
            self.connect_initial_backoff_ms,
            self.connect_max_backoff_ms,
        )?;
        if self.degraded_latency_ms == 0 {
            return Err(ConfigError::invalid("backend.degraded_latency_ms", "must be positive"));
        }
        Ok(())
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("id", &self.id)
            .field("options", &self.options.keys().collect::<Vec<_>>())
            .field("extra_artifacts", &self.extra_artifacts)
            .field("connect_max_attempts", &self.connect_max_attempts)
            .field("degraded_latency_ms", &self.degraded_latency_ms)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Provisioning and Logging
// ============================================================================

/// Provisioning deadline configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisioningConfig {
    /// Overall startup deadline in milliseconds.
    #[serde(default = "default_provisioning_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_PROVISIONING_TIMEOUT_MS,
        }
    }
}

impl ProvisioningConfig {
    /// Validates the deadline.
    fn validate(self) -> Result<(), ConfigError> {
        validate_timeout_range(
            "provisioning.timeout_ms",
            self.timeout_ms,
            MIN_PROVISIONING_TIMEOUT_MS,
            MAX_PROVISIONING_TIMEOUT_MS,
        )
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// JSON lines.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level filter; `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    /// Validates logging settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.level.as_str()) {
            return Err(ConfigError::invalid(
                "logging.level",
                format!("must be one of {}", LOG_LEVELS.join(", ")),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config {field}: {reason}")]
    Invalid {
        /// Offending field path.
        field: String,
        /// Rejection reason.
        reason: String,
    },
}

impl ConfigError {
    /// Builds an invalid-field error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::invalid(CONFIG_ENV_VAR, "config path exceeds max length"));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    validate_path_field("config", path)
}

/// Validates a configured path against length constraints.
fn validate_path_field(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::invalid(field, "path must be non-empty"));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::invalid(field, "path exceeds max length"));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::invalid(field, "path component too long"));
        }
    }
    Ok(())
}

/// Validates an `http`/`https` URL.
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|err| ConfigError::invalid(field, err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(field, format!("unsupported scheme {}", url.scheme())));
    }
    Ok(())
}

/// Validates a retry attempt budget.
fn validate_attempts(field: &str, value: u32) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_ATTEMPTS {
        return Err(ConfigError::invalid(field, format!("must be between 1 and {MAX_ATTEMPTS}")));
    }
    Ok(())
}

/// Validates a backoff pair.
fn validate_backoff(prefix: &str, initial_ms: u64, max_ms: u64) -> Result<(), ConfigError> {
    validate_timeout_range(
        &format!("{prefix}.initial_backoff_ms"),
        initial_ms,
        MIN_BACKOFF_MS,
        MAX_BACKOFF_MS,
    )?;
    validate_timeout_range(&format!("{prefix}.max_backoff_ms"), max_ms, initial_ms, MAX_BACKOFF_MS)
}

/// Validates a timeout value against bounds.
fn validate_timeout_range(
    field: &str,
    value_ms: u64,
    min_ms: u64,
    max_ms: u64,
) -> Result<(), ConfigError> {
    if value_ms < min_ms || value_ms > max_ms {
        return Err(ConfigError::invalid(
            field,
            format!("must be between {min_ms} and {max_ms} milliseconds"),
        ));
    }
    Ok(())
}

/// Default license product.
fn default_license_product() -> String {
    DEFAULT_LICENSE_PRODUCT.to_string()
}

/// Default license attempts.
const fn default_license_max_attempts() -> u32 {
    DEFAULT_LICENSE_MAX_ATTEMPTS
}

/// Default license initial backoff.
const fn default_license_initial_backoff_ms() -> u64 {
    DEFAULT_LICENSE_INITIAL_BACKOFF_MS
}

/// Default license backoff cap.
const fn default_license_max_backoff_ms() -> u64 {
    DEFAULT_LICENSE_MAX_BACKOFF_MS
}

/// Default license request timeout.
const fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

/// Default artifact cache directory.
fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

/// Default attempts per repository.
const fn default_repository_attempts() -> u32 {
    DEFAULT_REPOSITORY_ATTEMPTS
}

/// Default resolution initial backoff.
const fn default_resolve_initial_backoff_ms() -> u64 {
    DEFAULT_RESOLVE_INITIAL_BACKOFF_MS
}

/// Default resolution backoff cap.
const fn default_resolve_max_backoff_ms() -> u64 {
    DEFAULT_RESOLVE_MAX_BACKOFF_MS
}

/// Default artifact request timeout.
const fn default_artifact_timeout_ms() -> u64 {
    DEFAULT_ARTIFACT_TIMEOUT_MS
}

/// Default maximum artifact size.
const fn default_max_artifact_bytes() -> usize {
    DEFAULT_MAX_ARTIFACT_BYTES
}

/// Default connect attempts.
const fn default_connect_attempts() -> u32 {
    DEFAULT_CONNECT_ATTEMPTS
}

/// Default connect initial backoff.
const fn default_connect_initial_backoff_ms() -> u64 {
    DEFAULT_CONNECT_INITIAL_BACKOFF_MS
}

/// Default connect backoff cap.
const fn default_connect_max_backoff_ms() -> u64 {
    DEFAULT_CONNECT_MAX_BACKOFF_MS
}

/// Default degraded latency threshold.
const fn default_degraded_latency_ms() -> u64 {
    DEFAULT_DEGRADED_LATENCY_MS
}

/// Default provisioning timeout.
const fn default_provisioning_timeout_ms() -> u64 {
    DEFAULT_PROVISIONING_TIMEOUT_MS
}

/// Default log level.
fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::*;

    #[test]
    fn validate_timeout_range_accepts_bounds() {
        assert!(validate_timeout_range("t", 10, 10, 20).is_ok());
        assert!(validate_timeout_range("t", 20, 10, 20).is_ok());
    }

    #[test]
    fn validate_timeout_range_error_includes_field_and_bounds() {
        let err = validate_timeout_range("license.request_timeout_ms", 5, 10, 20).unwrap_err();
        assert_eq!(
            err,
            ConfigError::invalid(
                "license.request_timeout_ms",
                "must be between 10 and 20 milliseconds"
            )
        );
    }

    #[test]
    fn backoff_cap_must_not_undercut_initial_delay() {
        assert!(validate_backoff("license", 500, 100).is_err());
        assert!(validate_backoff("license", 100, 500).is_ok());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let repository = RepositoryConfig {
            id: "central".to_string(),
            url: "https://repo.example".to_string(),
            username: Some("deploy".to_string()),
            password: Some("hunter2".to_string()),
        };
        let rendered = format!("{repository:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
