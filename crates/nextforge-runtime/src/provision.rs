// crates/nextforge-runtime/src/provision.rs
// ============================================================================
// Module: Provisioning
// Description: Startup sequence from license check to a connected store.
// Purpose: Gate, resolve, and connect in order under an overall timeout.
// Dependencies: nextforge-config, nextforge-core, nextforge-license,
//               nextforge-resolver, tracing
// ============================================================================

//! ## Overview
//! Provisioning runs once per process:
//! 1. Validate configuration, look up the backend, validate its options, and
//!    pin its artifacts. Nothing here touches the network or disk.
//! 2. Verify the license; denial and exhausted retries are fatal.
//! 3. Resolve and verify the backend's artifacts in order.
//! 4. Connect the store, retrying while it is unreachable, then health-check it.
//!
//! Steps 2 to 4 run on a worker thread. When the overall timeout expires the
//! worker is cancelled and provisioning fails with a timeout; a store the
//! worker connects afterwards is dropped and disconnected, never returned.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;

use nextforge_config::ArtifactsConfig;
use nextforge_config::ConfigError;
use nextforge_config::NextforgeConfig;
use nextforge_core::ArtifactCoordinate;
use nextforge_core::BackoffPolicy;
use nextforge_core::Cancellation;
use nextforge_core::ConnectionError;
use nextforge_core::HealthStatus;
use nextforge_core::RecordStore;
use nextforge_core::Sleeper;
use nextforge_core::ThreadSleeper;
use nextforge_license::HttpLicenseService;
use nextforge_license::LicenseError;
use nextforge_license::LicenseGate;
use nextforge_license::LicenseGrant;
use nextforge_license::LicenseKey;
use nextforge_license::LicenseService;
use nextforge_resolver::Repository;
use nextforge_resolver::ResolutionError;
use nextforge_resolver::Resolver;
use nextforge_resolver::ResolverBuilder;
use nextforge_resolver::VerifiedArtifacts;
use thiserror::Error;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::handle::StoreHandle;
use crate::registry::BackendDescriptor;
use crate::registry::BackendError;
use crate::registry::UnknownBackendError;
use crate::registry::ValidatedOptions;
use crate::registry::lookup;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Operator-facing category of a provisioning failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionCategory {
    /// License authority denied the key.
    LicenseDenied,
    /// License authority stayed unavailable.
    LicenseUnavailable,
    /// Configuration was rejected.
    Config,
    /// Configured backend is not available.
    UnknownBackend,
    /// Artifact resolution failed.
    Resolution,
    /// Store connection failed.
    Connection,
    /// Overall timeout expired.
    Timeout,
    /// Provisioning machinery failed.
    Internal,
}

impl ProvisionCategory {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LicenseDenied => "license_denied",
            Self::LicenseUnavailable => "license_unavailable",
            Self::Config => "config",
            Self::UnknownBackend => "unknown_backend",
            Self::Resolution => "resolution",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }

    /// Returns the process exit code for the category.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::LicenseDenied => 10,
            Self::LicenseUnavailable => 11,
            Self::Config => 12,
            Self::UnknownBackend => 13,
            Self::Resolution => 14,
            Self::Connection => 15,
            Self::Timeout => 16,
            Self::Internal => 1,
        }
    }
}

impl fmt::Display for ProvisionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal provisioning failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    /// License authority denied the key.
    #[error("license denied: {reason}")]
    LicenseDenied {
        /// Reason reported by the authority.
        reason: String,
    },
    /// License authority stayed unavailable.
    #[error("license service unavailable after {attempts} attempts: {detail}")]
    LicenseUnavailable {
        /// Attempts made.
        attempts: u32,
        /// Last failure detail.
        detail: String,
    },
    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Configured backend is not available.
    #[error(transparent)]
    UnknownBackend(#[from] UnknownBackendError),
    /// Artifact resolution failed.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// Store connection failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// Overall timeout expired.
    #[error("provisioning timed out after {timeout_ms} ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },
    /// Work stopped because provisioning was cancelled.
    #[error("provisioning cancelled")]
    Cancelled,
    /// Provisioning machinery failed.
    #[error("provisioning failed: {0}")]
    Internal(String),
}

impl ProvisionError {
    /// Returns the operator-facing category.
    #[must_use]
    pub const fn category(&self) -> ProvisionCategory {
        match self {
            Self::LicenseDenied { .. } => ProvisionCategory::LicenseDenied,
            Self::LicenseUnavailable { .. } => ProvisionCategory::LicenseUnavailable,
            Self::Config(_) => ProvisionCategory::Config,
            Self::UnknownBackend(_) => ProvisionCategory::UnknownBackend,
            Self::Resolution(_) => ProvisionCategory::Resolution,
            Self::Connection(_) => ProvisionCategory::Connection,
            Self::Timeout { .. } | Self::Cancelled => ProvisionCategory::Timeout,
            Self::Internal(_) => ProvisionCategory::Internal,
        }
    }

    /// Returns the process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.category().exit_code()
    }
}

impl From<LicenseError> for ProvisionError {
    fn from(err: LicenseError) -> Self {
        match err {
            LicenseError::Denied {
                reason,
            } => Self::LicenseDenied {
                reason,
            },
            LicenseError::ServiceUnavailable {
                attempts,
                detail,
            } => Self::LicenseUnavailable {
                attempts,
                detail,
            },
            LicenseError::Cancelled => Self::Cancelled,
        }
    }
}

impl From<BackendError> for ProvisionError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Config(err) => Self::Config(err),
            BackendError::Connection(err) => Self::Connection(err),
            missing @ BackendError::MissingArtifacts { .. } => Self::Internal(missing.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Plan
// ============================================================================

/// Everything provisioning derives from configuration before any I/O.
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    /// Selected backend.
    backend: &'static BackendDescriptor,
    /// Backend options checked against its schema.
    options: ValidatedOptions,
    /// Pinned artifacts in load order.
    coordinates: Vec<ArtifactCoordinate>,
}

impl ProvisionPlan {
    /// Validates `config` and derives the plan.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Config`] for invalid settings, options, or
    /// missing pins, and [`ProvisionError::UnknownBackend`] when the backend
    /// id is not available.
    pub fn prepare(config: &NextforgeConfig) -> Result<Self, ProvisionError> {
        config.validate()?;
        let backend = lookup(&config.backend.id)?;
        let options = backend.validate(&config.backend)?;
        let coordinates = backend.pinned_requirements(&config.artifacts, &config.backend)?;
        Ok(Self {
            backend,
            options,
            coordinates,
        })
    }

    /// Returns the selected backend.
    #[must_use]
    pub const fn backend(&self) -> &'static BackendDescriptor {
        self.backend
    }

    /// Returns the validated backend options.
    #[must_use]
    pub const fn options(&self) -> &ValidatedOptions {
        &self.options
    }

    /// Returns the pinned artifacts in load order.
    #[must_use]
    pub fn coordinates(&self) -> &[ArtifactCoordinate] {
        &self.coordinates
    }
}

/// Builds a resolver from artifact settings.
///
/// # Errors
///
/// Returns [`ProvisionError`] when a repository URL is unusable or the HTTP
/// client cannot be built.
pub fn build_resolver(
    artifacts: &ArtifactsConfig,
    sleeper: Arc<dyn Sleeper>,
    cancellation: Cancellation,
) -> Result<Resolver, ProvisionError> {
    let mut builder = ResolverBuilder::new(artifacts.cache_dir.clone())
        .with_default_sources(Duration::from_millis(artifacts.request_timeout_ms), artifacts.max_artifact_bytes)
        .map_err(|err| ProvisionError::Internal(format!("artifact sources: {err}")))?;
    for config in &artifacts.repositories {
        let mut repository = Repository::new(config.id.clone(), &config.url).map_err(|err| {
            ConfigError::invalid("artifacts.repositories.url", format!("{}: {err}", config.id))
        })?;
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            repository = repository.with_credentials(username.clone(), password.clone());
        }
        builder = builder.repository(repository);
    }
    builder = builder
        .backoff(BackoffPolicy::new(
            artifacts.max_attempts_per_repository,
            Duration::from_millis(artifacts.initial_backoff_ms),
            Duration::from_millis(artifacts.max_backoff_ms),
        ))
        .sleeper(sleeper)
        .cancellation(cancellation);
    if let Some(lib_dir) = &artifacts.lib_dir {
        builder = builder.lib_dir(lib_dir.clone());
    }
    Ok(builder.build())
}

/// Resolves the configured backend's artifacts without a license check or
/// a connection.
///
/// # Errors
///
/// Returns [`ProvisionError`] for configuration or resolution failures.
pub fn resolve_backend_artifacts(config: &NextforgeConfig) -> Result<VerifiedArtifacts, ProvisionError> {
    let plan = ProvisionPlan::prepare(config)?;
    let resolver = build_resolver(&config.artifacts, Arc::new(ThreadSleeper), Cancellation::new())?;
    Ok(resolver.resolve(plan.coordinates())?)
}

// ============================================================================
// SECTION: Provisioner
// ============================================================================

/// Runs the startup sequence.
pub struct Provisioner {
    /// Process configuration.
    config: NextforgeConfig,
    /// License service override; HTTP service from config otherwise.
    license_service: Option<Arc<dyn LicenseService>>,
    /// Delay implementation for every retry loop.
    sleeper: Arc<dyn Sleeper>,
    /// Overall timeout.
    timeout: Duration,
}

impl Provisioner {
    /// Creates a provisioner using the configured timeout.
    #[must_use]
    pub fn new(config: NextforgeConfig) -> Self {
        let timeout = Duration::from_millis(config.provisioning.timeout_ms);
        Self {
            config,
            license_service: None,
            sleeper: Arc::new(ThreadSleeper),
            timeout,
        }
    }

    /// Uses `service` instead of the configured HTTP license service.
    #[must_use]
    pub fn with_license_service(mut self, service: Arc<dyn LicenseService>) -> Self {
        self.license_service = Some(service);
        self
    }

    /// Overrides the retry delay implementation.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Overrides the overall timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Provisions the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`]; its category identifies the failed step.
    pub fn provision(self) -> Result<StoreHandle, ProvisionError> {
        let plan = ProvisionPlan::prepare(&self.config)?;
        let service = match self.license_service {
            Some(service) => service,
            None => {
                let license = &self.config.license;
                let service = HttpLicenseService::new(
                    &license.endpoint,
                    license.product.clone(),
                    Duration::from_millis(license.request_timeout_ms),
                )
                .map_err(|reason| ConfigError::invalid("license.endpoint", reason))?;
                Arc::new(service)
            }
        };
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        info!(
            backend = plan.backend().id(),
            artifacts = plan.coordinates().len(),
            timeout_ms,
            "provisioning started"
        );

        let cancellation = Cancellation::new();
        let worker = Worker {
            key: LicenseKey::new(self.config.license.key.clone()),
            config: self.config,
            plan,
            service,
            sleeper: self.sleeper,
            cancellation: cancellation.clone(),
        };
        let (sender, receiver) = mpsc::channel();
        thread::Builder::new()
            .name("nextforge-provision".to_string())
            .spawn(move || {
                let _ = sender.send(worker.run());
            })
            .map_err(|err| ProvisionError::Internal(format!("failed to start provisioning worker: {err}")))?;

        match receiver.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                cancellation.cancel();
                error!(timeout_ms, "provisioning timed out; cancelling");
                Err(ProvisionError::Timeout {
                    timeout_ms,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(ProvisionError::Internal("provisioning worker exited without a result".to_string()))
            }
        }
    }
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// State moved onto the provisioning thread.
struct Worker {
    /// Process configuration.
    config: NextforgeConfig,
    /// Validated plan.
    plan: ProvisionPlan,
    /// License key.
    key: LicenseKey,
    /// License authority client.
    service: Arc<dyn LicenseService>,
    /// Delay implementation.
    sleeper: Arc<dyn Sleeper>,
    /// Set when the caller gave up.
    cancellation: Cancellation,
}

impl Worker {
    /// Runs license, resolution, and connection in order.
    fn run(self) -> Result<StoreHandle, ProvisionError> {
        let grant = self.verify_license()?;
        let artifacts = self.resolve()?;
        let store = self.connect(&artifacts)?;
        let handle = StoreHandle::new(
            self.plan.backend(),
            store,
            artifacts,
            grant,
            Duration::from_millis(self.config.backend.degraded_latency_ms),
        );
        if let HealthStatus::Down {
            reason,
        } = handle.health_check()
        {
            return Err(ConnectionError::unreachable(format!("health check failed: {reason}")).into());
        }
        if self.cancellation.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }
        info!(backend = handle.backend_id(), family = %handle.family(), "store ready");
        Ok(handle)
    }

    /// Verifies the license with bounded retries.
    fn verify_license(&self) -> Result<LicenseGrant, ProvisionError> {
        let license = &self.config.license;
        let gate = LicenseGate::new(
            Arc::clone(&self.service),
            BackoffPolicy::new(
                license.max_attempts,
                Duration::from_millis(license.initial_backoff_ms),
                Duration::from_millis(license.max_backoff_ms),
            ),
        )
        .with_sleeper(Arc::clone(&self.sleeper))
        .with_cancellation(self.cancellation.clone());
        Ok(gate.verify(&self.key)?)
    }

    /// Resolves the plan's artifacts.
    fn resolve(&self) -> Result<VerifiedArtifacts, ProvisionError> {
        if self.cancellation.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }
        let resolver = build_resolver(&self.config.artifacts, Arc::clone(&self.sleeper), self.cancellation.clone())?;
        let artifacts = resolver.resolve(self.plan.coordinates())?;
        if !artifacts.covers(self.plan.coordinates()) {
            return Err(ProvisionError::Internal("resolver returned an incomplete artifact set".to_string()));
        }
        Ok(artifacts)
    }

    /// Connects the store, retrying while it is unreachable.
    fn connect(&self, artifacts: &VerifiedArtifacts) -> Result<Box<dyn RecordStore>, ProvisionError> {
        let backend = &self.config.backend;
        let policy = BackoffPolicy::new(
            backend.connect_max_attempts,
            Duration::from_millis(backend.connect_initial_backoff_ms),
            Duration::from_millis(backend.connect_max_backoff_ms),
        );
        let id = self.plan.backend().id();
        let mut attempt = 1;
        loop {
            if self.cancellation.is_cancelled() {
                return Err(ProvisionError::Cancelled);
            }
            info!(backend = id, attempt, "connecting store");
            match self.plan.backend().connect(artifacts, self.plan.options(), &self.config.collections) {
                Ok(store) => return Ok(store),
                Err(BackendError::Connection(err)) if err.kind().is_transient() && attempt < policy.max_attempts() => {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        backend = id,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "store unreachable; retrying"
                    );
                    self.sleeper.sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    error!(backend = id, attempt, error = %err, "store connection failed");
                    return Err(err.into());
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
