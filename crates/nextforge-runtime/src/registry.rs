// crates/nextforge-runtime/src/registry.rs
// ============================================================================
// Module: Backend Registry
// Description: Static catalog of storage backends and their option schemas.
// Purpose: Map configured backend ids to requirements, options, and factories.
// Dependencies: nextforge-config, nextforge-core, store crates, toml
// ============================================================================

//! ## Overview
//! The registry is built once, on first use, from a fixed table and is
//! read-only afterwards. Each [`BackendDescriptor`] names the artifacts the
//! backend needs, the options it accepts, and the factory that connects a
//! store. Backends behind a disabled cargo feature are still known by id so a
//! request for them reports that they were compiled out.
//!
//! Option validation is fail-closed: unknown options, missing required
//! options, wrong types, and out-of-range values are all rejected before any
//! connection attempt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::OnceLock;
#[cfg(any(feature = "mysql", feature = "mongo"))]
use std::time::Duration;

use nextforge_config::ArtifactsConfig;
use nextforge_config::BackendConfig;
use nextforge_config::ConfigError;
use nextforge_core::ArtifactCoordinate;
use nextforge_core::ArtifactId;
use nextforge_core::ConnectionError;
use nextforge_core::RecordSchema;
use nextforge_core::RecordStore;
use nextforge_resolver::VerifiedArtifacts;
use nextforge_store_document::DocumentStore;
use nextforge_store_document::JsonFileDriver;
use nextforge_store_document::JsonStoreOptions;
use nextforge_store_relational::RelationalStore;
use nextforge_store_relational::SqliteDriver;
use nextforge_store_relational::SqliteJournalMode;
use nextforge_store_relational::SqliteOptions;
use nextforge_store_relational::SqliteSyncMode;
use thiserror::Error;

// ============================================================================
// SECTION: Option Schema
// ============================================================================

/// Storage family served by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendFamily {
    /// Row form over SQL tables.
    Relational,
    /// Document form over collections.
    Document,
}

impl BackendFamily {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted type of a backend option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Non-empty string.
    Text,
    /// Integer within an inclusive range.
    Integer {
        /// Lowest accepted value.
        min: i64,
        /// Highest accepted value.
        max: i64,
    },
    /// Boolean flag.
    Boolean,
    /// One of a fixed set of strings.
    Enum(&'static [&'static str]),
    /// Filesystem path.
    Path,
    /// Credential; never logged or displayed.
    Secret,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("string"),
            Self::Integer {
                min,
                max,
            } => write!(f, "integer {min}..={max}"),
            Self::Boolean => f.write_str("bool"),
            Self::Enum(values) => write!(f, "one of {}", values.join("|")),
            Self::Path => f.write_str("path"),
            Self::Secret => f.write_str("secret"),
        }
    }
}

/// Default applied when an optional option is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionDefault {
    /// Integer default.
    Integer(i64),
    /// Boolean default.
    Boolean(bool),
    /// String default, also used for enums.
    Text(&'static str),
}

impl fmt::Display for OptionDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Schema entry for one backend option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    /// Option name under `[backend.options]`.
    pub name: &'static str,
    /// Accepted type.
    pub kind: OptionKind,
    /// Whether the option must be present.
    pub required: bool,
    /// Value used when the option is absent.
    pub default: Option<OptionDefault>,
    /// One-line description for listings.
    pub description: &'static str,
}

impl OptionSpec {
    /// Required option without a default.
    const fn required(name: &'static str, kind: OptionKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
            description,
        }
    }

    /// Optional option without a default.
    const fn optional(name: &'static str, kind: OptionKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
            description,
        }
    }

    /// Optional option with a default.
    const fn defaulted(
        name: &'static str,
        kind: OptionKind,
        default: OptionDefault,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: Some(default),
            description,
        }
    }
}

// ============================================================================
// SECTION: Validated Options
// ============================================================================

/// A validated option value.
#[derive(Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// String or enum value.
    Text(String),
    /// Integer value.
    Integer(i64),
    /// Boolean value.
    Boolean(bool),
    /// Path value.
    Path(PathBuf),
    /// Credential value.
    Secret(String),
}

impl fmt::Debug for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.debug_tuple("Text").field(value).finish(),
            Self::Integer(value) => f.debug_tuple("Integer").field(value).finish(),
            Self::Boolean(value) => f.debug_tuple("Boolean").field(value).finish(),
            Self::Path(value) => f.debug_tuple("Path").field(value).finish(),
            Self::Secret(_) => f.write_str("Secret(<redacted>)"),
        }
    }
}

/// Backend options checked against a descriptor's schema.
///
/// # Invariants
/// - Every declared option with a default is present.
/// - Every present option matches its declared kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOptions {
    /// Backend the options were validated for.
    backend: &'static str,
    /// Values keyed by option name.
    values: BTreeMap<String, OptionValue>,
}

impl ValidatedOptions {
    /// Returns the raw value of an option.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    /// Returns a required string or enum option.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the option is absent or not a string.
    pub fn text(&self, name: &str) -> Result<&str, ConfigError> {
        match self.values.get(name) {
            Some(OptionValue::Text(value)) => Ok(value),
            _ => Err(self.missing(name, "string")),
        }
    }

    /// Returns an optional string option.
    #[must_use]
    pub fn optional_text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(OptionValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns an optional credential.
    #[must_use]
    pub fn secret(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(OptionValue::Secret(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns a required integer option.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the option is absent or not an integer.
    pub fn integer(&self, name: &str) -> Result<i64, ConfigError> {
        match self.values.get(name) {
            Some(OptionValue::Integer(value)) => Ok(*value),
            _ => Err(self.missing(name, "integer")),
        }
    }

    /// Returns a required integer option converted to a narrower type.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the option is absent or does not fit.
    pub fn integer_as<T: TryFrom<i64>>(&self, name: &str) -> Result<T, ConfigError> {
        let value = self.integer(name)?;
        T::try_from(value).map_err(|_| ConfigError::invalid(self.field(name), format!("{value} is out of range")))
    }

    /// Returns a required boolean option.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the option is absent or not a boolean.
    pub fn boolean(&self, name: &str) -> Result<bool, ConfigError> {
        match self.values.get(name) {
            Some(OptionValue::Boolean(value)) => Ok(*value),
            _ => Err(self.missing(name, "bool")),
        }
    }

    /// Returns an optional path option.
    #[must_use]
    pub fn path(&self, name: &str) -> Option<&Path> {
        match self.values.get(name) {
            Some(OptionValue::Path(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns a required path option.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the option is absent.
    pub fn required_path(&self, name: &str) -> Result<&Path, ConfigError> {
        self.path(name).ok_or_else(|| self.missing(name, "path"))
    }

    /// Iterates option names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns the config field path of an option.
    fn field(&self, name: &str) -> String {
        format!("backend.options.{name}")
    }

    /// Builds the error for an absent or mistyped option.
    fn missing(&self, name: &str, expected: &str) -> ConfigError {
        ConfigError::invalid(self.field(name), format!("{expected} option required by backend {}", self.backend))
    }
}

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Failure while building a store from validated options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Options could not be turned into engine settings.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The engine rejected the connection.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// Required artifacts were not in the verified set.
    #[error("backend {backend} requires unverified artifacts: {missing}")]
    MissingArtifacts {
        /// Backend identifier.
        backend: &'static str,
        /// Missing coordinates, comma separated.
        missing: String,
    },
}

/// Cross-option check run after per-option validation.
type OptionCheck = fn(&ValidatedOptions) -> Result<(), ConfigError>;

/// Store factory.
type StoreFactory = fn(&ValidatedOptions, &[RecordSchema]) -> Result<Box<dyn RecordStore>, BackendError>;

/// Registered storage backend.
///
/// # Invariants
/// - `requirements` are `group:name:version` coordinates in load order.
/// - Option names are unique.
pub struct BackendDescriptor {
    /// Configuration identifier.
    id: &'static str,
    /// Storage family.
    family: BackendFamily,
    /// One-line description for listings.
    description: &'static str,
    /// Required artifacts in load order.
    requirements: &'static [&'static str],
    /// Accepted options.
    options: &'static [OptionSpec],
    /// Cross-option rules.
    check: OptionCheck,
    /// Store factory.
    factory: StoreFactory,
}

impl BackendDescriptor {
    /// Returns the configuration identifier.
    #[must_use]
    pub const fn id(&self) -> &'static str {
        self.id
    }

    /// Returns the storage family.
    #[must_use]
    pub const fn family(&self) -> BackendFamily {
        self.family
    }

    /// Returns the listing description.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        self.description
    }

    /// Returns the accepted options.
    #[must_use]
    pub const fn options(&self) -> &'static [OptionSpec] {
        self.options
    }

    /// Returns the required artifact coordinates as written in the table.
    #[must_use]
    pub const fn requirement_names(&self) -> &'static [&'static str] {
        self.requirements
    }

    /// Returns the required artifact identities in load order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a table entry is malformed.
    pub fn requirements(&self) -> Result<Vec<ArtifactId>, ConfigError> {
        self.requirements
            .iter()
            .map(|entry| {
                ArtifactId::parse(entry).map_err(|err| {
                    ConfigError::invalid("backend.id", format!("backend {} requirement {entry}: {err}", self.id))
                })
            })
            .collect()
    }

    /// Returns every coordinate to resolve: the backend's own requirements
    /// with their pins, then `backend.extra_artifacts` in order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a requirement has no pin or a pin is
    /// malformed.
    pub fn pinned_requirements(
        &self,
        artifacts: &ArtifactsConfig,
        backend: &BackendConfig,
    ) -> Result<Vec<ArtifactCoordinate>, ConfigError> {
        let mut coordinates = Vec::new();
        for id in self.requirements()? {
            coordinates.push(artifacts.pinned(&id)?);
        }
        for pin in &backend.extra_artifacts {
            let coordinate = pin.to_coordinate("backend.extra_artifacts")?;
            if coordinates.iter().any(|existing| existing.id() == coordinate.id()) {
                return Err(ConfigError::invalid(
                    "backend.extra_artifacts",
                    format!("{} is already required by backend {}", coordinate.id(), self.id),
                ));
            }
            coordinates.push(coordinate);
        }
        Ok(coordinates)
    }

    /// Validates `config.options` against the option schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first offending option.
    pub fn validate(&self, config: &BackendConfig) -> Result<ValidatedOptions, ConfigError> {
        if config.id != self.id {
            return Err(ConfigError::invalid(
                "backend.id",
                format!("options for {} validated against backend {}", config.id, self.id),
            ));
        }
        if let Some(unknown) = config.options.keys().find(|name| self.option(name).is_none()) {
            return Err(ConfigError::invalid(
                format!("backend.options.{unknown}"),
                format!("unknown option for backend {}", self.id),
            ));
        }
        let mut values = BTreeMap::new();
        for spec in self.options {
            let field = format!("backend.options.{}", spec.name);
            let value = match (config.options.get(spec.name), spec.default) {
                (Some(raw), _) => convert(&field, spec.kind, raw)?,
                (None, Some(default)) => default_value(spec.kind, default),
                (None, None) if spec.required => {
                    return Err(ConfigError::invalid(field, format!("required by backend {}", self.id)));
                }
                (None, None) => continue,
            };
            values.insert(spec.name.to_string(), value);
        }
        let options = ValidatedOptions {
            backend: self.id,
            values,
        };
        (self.check)(&options)?;
        Ok(options)
    }

    /// Connects a store with validated options.
    ///
    /// `artifacts` must hold every artifact the backend requires; only the
    /// resolver can produce a [`VerifiedArtifacts`] set.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::MissingArtifacts`] when a requirement was not
    /// verified, and other [`BackendError`] variants when the options cannot
    /// be applied or the engine rejects the connection.
    pub fn connect(
        &self,
        artifacts: &VerifiedArtifacts,
        options: &ValidatedOptions,
        schemas: &[RecordSchema],
    ) -> Result<Box<dyn RecordStore>, BackendError> {
        let missing: Vec<String> = self
            .requirements()?
            .into_iter()
            .filter(|id| artifacts.get(id).is_none())
            .map(|id| id.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BackendError::MissingArtifacts {
                backend: self.id,
                missing: missing.join(", "),
            });
        }
        (self.factory)(options, schemas)
    }

    /// Returns the schema entry for an option.
    fn option(&self, name: &str) -> Option<&'static OptionSpec> {
        self.options.iter().find(|spec| spec.name == name)
    }
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("id", &self.id)
            .field("family", &self.family)
            .field("requirements", &self.requirements)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Requested backend is not available in this build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnknownBackendError {
    /// No backend has the identifier.
    #[error("unknown backend {id} (available: {available})")]
    Unknown {
        /// Requested identifier.
        id: String,
        /// Comma-separated registered identifiers.
        available: String,
    },
    /// The backend exists but its cargo feature is disabled.
    #[error("backend {id} is not compiled into this build (enable the {feature} feature)")]
    CompiledOut {
        /// Requested identifier.
        id: String,
        /// Cargo feature providing the backend.
        feature: &'static str,
    },
}

/// Backends that exist behind cargo features, with the feature name.
const FEATURE_GATED: &[(&str, &str)] = &[("mysql", "mysql"), ("mongo", "mongo")];

/// Read-only backend catalog.
pub struct BackendRegistry {
    /// Descriptors in listing order.
    descriptors: Vec<BackendDescriptor>,
}

impl BackendRegistry {
    /// Looks up a backend by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownBackendError`] when no compiled backend matches.
    pub fn lookup(&self, id: &str) -> Result<&BackendDescriptor, UnknownBackendError> {
        if let Some(descriptor) = self.descriptors.iter().find(|descriptor| descriptor.id == id) {
            return Ok(descriptor);
        }
        if let Some((_, feature)) = FEATURE_GATED.iter().find(|(gated, _)| *gated == id) {
            return Err(UnknownBackendError::CompiledOut {
                id: id.to_string(),
                feature: *feature,
            });
        }
        Err(UnknownBackendError::Unknown {
            id: id.to_string(),
            available: self.ids().collect::<Vec<_>>().join(", "),
        })
    }

    /// Iterates descriptors in listing order.
    pub fn descriptors(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.descriptors.iter()
    }

    /// Iterates registered identifiers.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.iter().map(|descriptor| descriptor.id)
    }
}

/// Process-wide registry, built on first use.
static REGISTRY: OnceLock<BackendRegistry> = OnceLock::new();

/// Returns the process-wide backend registry.
#[must_use]
pub fn registry() -> &'static BackendRegistry {
    REGISTRY.get_or_init(|| {
        let mut descriptors = vec![h2_descriptor()];
        #[cfg(feature = "mysql")]
        descriptors.push(mysql_descriptor());
        #[cfg(feature = "mongo")]
        descriptors.push(mongo_descriptor());
        descriptors.push(json_descriptor());
        BackendRegistry {
            descriptors,
        }
    })
}

/// Looks up a backend in the process-wide registry.
///
/// # Errors
///
/// Returns [`UnknownBackendError`] when no compiled backend matches.
pub fn lookup(id: &str) -> Result<&'static BackendDescriptor, UnknownBackendError> {
    registry().lookup(id)
}

// ============================================================================
// SECTION: Embedded Relational (h2)
// ============================================================================

/// Options accepted by `h2`.
const H2_OPTIONS: &[OptionSpec] = &[
    OptionSpec::optional("path", OptionKind::Path, "database file; required unless in_memory"),
    OptionSpec::defaulted("in_memory", OptionKind::Boolean, OptionDefault::Boolean(false), "private in-memory database"),
    OptionSpec::defaulted(
        "busy_timeout_ms",
        OptionKind::Integer {
            min: 0,
            max: 60_000,
        },
        OptionDefault::Integer(5_000),
        "lock wait before failing",
    ),
    OptionSpec::defaulted(
        "journal_mode",
        OptionKind::Enum(&["wal", "delete"]),
        OptionDefault::Text("wal"),
        "journal mode",
    ),
    OptionSpec::defaulted(
        "sync_mode",
        OptionKind::Enum(&["full", "normal"]),
        OptionDefault::Text("full"),
        "synchronous mode",
    ),
];

/// Descriptor for the embedded relational backend.
fn h2_descriptor() -> BackendDescriptor {
    BackendDescriptor {
        id: "h2",
        family: BackendFamily::Relational,
        description: "embedded relational store (SQLite engine)",
        requirements: &["com.h2database:h2:2.2.224"],
        options: H2_OPTIONS,
        check: check_h2,
        factory: connect_h2,
    }
}

/// Requires a path unless the database is in memory.
fn check_h2(options: &ValidatedOptions) -> Result<(), ConfigError> {
    match (options.boolean("in_memory")?, options.path("path")) {
        (false, None) => Err(ConfigError::invalid("backend.options.path", "required unless in_memory = true")),
        (true, Some(_)) => Err(ConfigError::invalid("backend.options.path", "must be omitted when in_memory = true")),
        _ => Ok(()),
    }
}

/// Opens the embedded relational store.
fn connect_h2(options: &ValidatedOptions, schemas: &[RecordSchema]) -> Result<Box<dyn RecordStore>, BackendError> {
    let base = if options.boolean("in_memory")? {
        SqliteOptions::in_memory()
    } else {
        SqliteOptions::file(options.required_path("path")?)
    };
    let journal_mode = SqliteJournalMode::parse(options.text("journal_mode")?)
        .ok_or_else(|| ConfigError::invalid("backend.options.journal_mode", "unsupported journal mode"))?;
    let sync_mode = SqliteSyncMode::parse(options.text("sync_mode")?)
        .ok_or_else(|| ConfigError::invalid("backend.options.sync_mode", "unsupported sync mode"))?;
    let sqlite = SqliteOptions {
        busy_timeout_ms: options.integer_as("busy_timeout_ms")?,
        journal_mode,
        sync_mode,
        ..base
    };
    let driver = SqliteDriver::open(&sqlite).map_err(|err| BackendError::Connection(err.into_connection()))?;
    Ok(Box::new(RelationalStore::connect(Box::new(driver), schemas)?))
}

// ============================================================================
// SECTION: MySQL
// ============================================================================

/// Options accepted by `mysql`.
#[cfg(feature = "mysql")]
const MYSQL_OPTIONS: &[OptionSpec] = &[
    OptionSpec::required("host", OptionKind::Text, "server host"),
    OptionSpec::defaulted(
        "port",
        OptionKind::Integer {
            min: 1,
            max: 65_535,
        },
        OptionDefault::Integer(3_306),
        "server port",
    ),
    OptionSpec::required("user", OptionKind::Text, "login user"),
    OptionSpec::optional("password", OptionKind::Secret, "login password"),
    OptionSpec::required("database", OptionKind::Text, "schema name"),
    OptionSpec::defaulted(
        "pool_max",
        OptionKind::Integer {
            min: 1,
            max: 256,
        },
        OptionDefault::Integer(10),
        "maximum pooled connections",
    ),
    OptionSpec::defaulted(
        "connect_timeout_ms",
        OptionKind::Integer {
            min: 100,
            max: 60_000,
        },
        OptionDefault::Integer(5_000),
        "TCP connect timeout",
    ),
];

/// Descriptor for the `MySQL` backend.
#[cfg(feature = "mysql")]
fn mysql_descriptor() -> BackendDescriptor {
    BackendDescriptor {
        id: "mysql",
        family: BackendFamily::Relational,
        description: "MySQL server",
        requirements: &["com.mysql:mysql-connector-j:8.4.0"],
        options: MYSQL_OPTIONS,
        check: no_check,
        factory: connect_mysql,
    }
}

/// Connects the `MySQL` store.
#[cfg(feature = "mysql")]
fn connect_mysql(options: &ValidatedOptions, schemas: &[RecordSchema]) -> Result<Box<dyn RecordStore>, BackendError> {
    use nextforge_store_relational::MysqlDriver;
    use nextforge_store_relational::MysqlOptions;

    let mysql = MysqlOptions {
        host: options.text("host")?.to_string(),
        port: options.integer_as("port")?,
        user: options.text("user")?.to_string(),
        password: options.secret("password").map(str::to_string),
        database: options.text("database")?.to_string(),
        pool_max: options.integer_as("pool_max")?,
        connect_timeout: Duration::from_millis(options.integer_as("connect_timeout_ms")?),
    };
    let driver = MysqlDriver::open(&mysql).map_err(|err| BackendError::Connection(err.into_connection()))?;
    Ok(Box::new(RelationalStore::connect(Box::new(driver), schemas)?))
}

// ============================================================================
// SECTION: MongoDB
// ============================================================================

/// Options accepted by `mongo`.
#[cfg(feature = "mongo")]
const MONGO_OPTIONS: &[OptionSpec] = &[
    OptionSpec::required("host", OptionKind::Text, "server host"),
    OptionSpec::defaulted(
        "port",
        OptionKind::Integer {
            min: 1,
            max: 65_535,
        },
        OptionDefault::Integer(27_017),
        "server port",
    ),
    OptionSpec::optional("user", OptionKind::Text, "login user; requires password"),
    OptionSpec::optional("password", OptionKind::Secret, "login password; requires user"),
    OptionSpec::required("database", OptionKind::Text, "database name"),
    OptionSpec::defaulted("auth_source", OptionKind::Text, OptionDefault::Text("admin"), "authentication database"),
    OptionSpec::defaulted(
        "connect_timeout_ms",
        OptionKind::Integer {
            min: 100,
            max: 60_000,
        },
        OptionDefault::Integer(5_000),
        "connect and server selection timeout",
    ),
];

/// Descriptor for the `MongoDB` backend.
#[cfg(feature = "mongo")]
fn mongo_descriptor() -> BackendDescriptor {
    BackendDescriptor {
        id: "mongo",
        family: BackendFamily::Document,
        description: "MongoDB server",
        requirements: &[
            "org.mongodb:bson:4.11.1",
            "org.mongodb:mongodb-driver-core:4.11.1",
            "org.mongodb:mongodb-driver-sync:4.11.1",
        ],
        options: MONGO_OPTIONS,
        check: check_mongo,
        factory: connect_mongo,
    }
}

/// Requires user and password together.
#[cfg(feature = "mongo")]
fn check_mongo(options: &ValidatedOptions) -> Result<(), ConfigError> {
    match (options.optional_text("user"), options.secret("password")) {
        (Some(_), Some(_)) | (None, None) => Ok(()),
        _ => Err(ConfigError::invalid("backend.options.user", "user and password must be set together")),
    }
}

/// Connects the `MongoDB` store.
#[cfg(feature = "mongo")]
fn connect_mongo(options: &ValidatedOptions, schemas: &[RecordSchema]) -> Result<Box<dyn RecordStore>, BackendError> {
    use nextforge_store_document::MongoDriver;
    use nextforge_store_document::MongoOptions;

    let mongo = MongoOptions {
        host: options.text("host")?.to_string(),
        port: options.integer_as("port")?,
        user: options.optional_text("user").map(str::to_string),
        password: options.secret("password").map(str::to_string),
        database: options.text("database")?.to_string(),
        auth_source: options.text("auth_source")?.to_string(),
        connect_timeout: Duration::from_millis(options.integer_as("connect_timeout_ms")?),
    };
    let driver = MongoDriver::open(&mongo).map_err(|err| BackendError::Connection(err.into_connection()))?;
    Ok(Box::new(DocumentStore::connect(Box::new(driver), schemas)?))
}

// ============================================================================
// SECTION: Embedded Document (json)
// ============================================================================

/// Options accepted by `json`.
const JSON_OPTIONS: &[OptionSpec] = &[
    OptionSpec::required("directory", OptionKind::Path, "store directory"),
    OptionSpec::defaulted("pretty", OptionKind::Boolean, OptionDefault::Boolean(false), "indent collection files"),
];

/// Descriptor for the embedded document backend.
fn json_descriptor() -> BackendDescriptor {
    BackendDescriptor {
        id: "json",
        family: BackendFamily::Document,
        description: "embedded document store (one JSON file per collection)",
        requirements: &[],
        options: JSON_OPTIONS,
        check: no_check,
        factory: connect_json,
    }
}

/// Opens the embedded document store.
fn connect_json(options: &ValidatedOptions, schemas: &[RecordSchema]) -> Result<Box<dyn RecordStore>, BackendError> {
    let json = JsonStoreOptions {
        pretty: options.boolean("pretty")?,
        ..JsonStoreOptions::new(options.required_path("directory")?)
    };
    let driver = JsonFileDriver::open(&json).map_err(|err| BackendError::Connection(err.into_connection()))?;
    Ok(Box::new(DocumentStore::connect(Box::new(driver), schemas)?))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Accepts any option combination.
const fn no_check(_: &ValidatedOptions) -> Result<(), ConfigError> {
    Ok(())
}

/// Converts a raw TOML value to the declared kind.
fn convert(field: &str, kind: OptionKind, raw: &toml::Value) -> Result<OptionValue, ConfigError> {
    let mismatch = || ConfigError::invalid(field, format!("expected {kind}, found {}", raw.type_str()));
    match kind {
        OptionKind::Text => match raw.as_str() {
            Some(value) if !value.trim().is_empty() => Ok(OptionValue::Text(value.to_string())),
            Some(_) => Err(ConfigError::invalid(field, "must be non-empty")),
            None => Err(mismatch()),
        },
        OptionKind::Secret => raw.as_str().map(|value| OptionValue::Secret(value.to_string())).ok_or_else(mismatch),
        OptionKind::Path => match raw.as_str() {
            Some(value) if !value.trim().is_empty() => Ok(OptionValue::Path(PathBuf::from(value))),
            Some(_) => Err(ConfigError::invalid(field, "path must be non-empty")),
            None => Err(mismatch()),
        },
        OptionKind::Boolean => raw.as_bool().map(OptionValue::Boolean).ok_or_else(mismatch),
        OptionKind::Integer {
            min,
            max,
        } => {
            let value = raw.as_integer().ok_or_else(mismatch)?;
            if (min..=max).contains(&value) {
                Ok(OptionValue::Integer(value))
            } else {
                Err(ConfigError::invalid(field, format!("must be between {min} and {max}")))
            }
        }
        OptionKind::Enum(allowed) => {
            let value = raw.as_str().ok_or_else(mismatch)?;
            if allowed.contains(&value) {
                Ok(OptionValue::Text(value.to_string()))
            } else {
                Err(ConfigError::invalid(field, format!("must be one of {}", allowed.join(", "))))
            }
        }
    }
}

/// Materializes a declared default.
fn default_value(kind: OptionKind, default: OptionDefault) -> OptionValue {
    match (kind, default) {
        (OptionKind::Path, OptionDefault::Text(value)) => OptionValue::Path(PathBuf::from(value)),
        (OptionKind::Secret, OptionDefault::Text(value)) => OptionValue::Secret(value.to_string()),
        (_, OptionDefault::Text(value)) => OptionValue::Text(value.to_string()),
        (_, OptionDefault::Integer(value)) => OptionValue::Integer(value),
        (_, OptionDefault::Boolean(value)) => OptionValue::Boolean(value),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::use_debug,
        reason = "Test-only assertions and debug output are permitted."
    )]

    use super::*;

    fn backend(id: &str, options: &str) -> BackendConfig {
        toml::from_str(&format!("id = \"{id}\"\n[options]\n{options}")).unwrap()
    }

    #[test]
    fn every_requirement_parses() {
        for descriptor in registry().descriptors() {
            assert_eq!(descriptor.requirements().unwrap().len(), descriptor.requirement_names().len());
        }
    }

    #[test]
    fn option_names_are_unique() {
        for descriptor in registry().descriptors() {
            let mut names: Vec<_> = descriptor.options().iter().map(|spec| spec.name).collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), descriptor.options().len(), "{}", descriptor.id());
        }
    }

    #[test]
    fn defaults_are_applied() {
        let options = lookup("h2").unwrap().validate(&backend("h2", "path = \"db.sqlite\"")).unwrap();
        assert_eq!(options.integer("busy_timeout_ms").unwrap(), 5_000);
        assert_eq!(options.text("journal_mode").unwrap(), "wal");
        assert!(!options.boolean("in_memory").unwrap());
    }

    #[test]
    fn unknown_option_is_rejected() {
        let err = lookup("h2").unwrap().validate(&backend("h2", "path = \"a\"\nhostname = \"x\"")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "backend.options.hostname"));
    }

    #[test]
    fn out_of_range_and_mistyped_values_are_rejected() {
        let h2 = lookup("h2").unwrap();
        let err = h2.validate(&backend("h2", "path = \"a\"\nbusy_timeout_ms = 60001")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "backend.options.busy_timeout_ms"));
        let err = h2.validate(&backend("h2", "path = \"a\"\njournal_mode = \"memory\"")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "backend.options.journal_mode"));
        let err = h2.validate(&backend("h2", "path = 3")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "backend.options.path"));
    }

    #[test]
    fn h2_requires_path_unless_in_memory() {
        let h2 = lookup("h2").unwrap();
        assert!(h2.validate(&backend("h2", "")).is_err());
        assert!(h2.validate(&backend("h2", "in_memory = true")).is_ok());
        assert!(h2.validate(&backend("h2", "in_memory = true\npath = \"a\"")).is_err());
    }

    #[test]
    fn required_option_is_enforced() {
        let err = lookup("json").unwrap().validate(&backend("json", "pretty = true")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "backend.options.directory"));
    }

    #[test]
    fn unknown_backend_lists_available_ids() {
        let err = lookup("postgres").unwrap_err();
        assert!(matches!(&err, UnknownBackendError::Unknown { available, .. } if available.contains("h2")));
    }

    #[cfg(feature = "mongo")]
    #[test]
    fn mongo_credentials_come_in_pairs() {
        let mongo = lookup("mongo").unwrap();
        let err = mongo.validate(&backend("mongo", "host = \"db\"\ndatabase = \"game\"\nuser = \"u\"")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "backend.options.user"));
        let options = mongo
            .validate(&backend("mongo", "host = \"db\"\ndatabase = \"game\"\nuser = \"u\"\npassword = \"p\""))
            .unwrap();
        assert_eq!(options.text("auth_source").unwrap(), "admin");
        assert_eq!(options.integer("port").unwrap(), 27_017);
    }

    #[cfg(not(feature = "mysql"))]
    #[test]
    fn disabled_backend_reports_feature() {
        assert!(matches!(lookup("mysql"), Err(UnknownBackendError::CompiledOut { feature: "mysql", .. })));
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let rendered = format!("{:?}", OptionValue::Secret("hunter2".to_string()));
        assert!(!rendered.contains("hunter2"));
    }
}
