// crates/nextforge-runtime/src/handle.rs
// ============================================================================
// Module: Store Handle
// Description: The live, connected backend of a provisioned process.
// Purpose: Own the store, its verified artifacts, and the license grant.
// Dependencies: nextforge-core, nextforge-license, nextforge-resolver
// ============================================================================

//! ## Overview
//! A [`StoreHandle`] is only built by provisioning, after the license gate
//! granted access and the resolver verified every artifact the backend
//! requires. Dropping the handle disconnects the store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use nextforge_core::Filter;
use nextforge_core::HealthStatus;
use nextforge_core::RecordCursor;
use nextforge_core::RecordStore;
use nextforge_core::StoreError;
use nextforge_license::LicenseGrant;
use nextforge_resolver::VerifiedArtifacts;
use tracing::info;
use tracing::warn;

use crate::registry::BackendDescriptor;
use crate::registry::BackendFamily;

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Connected backend.
///
/// # Invariants
/// - `artifacts` covers every artifact the backend required.
/// - The store is disconnected exactly once, on shutdown or drop.
pub struct StoreHandle {
    /// Backend the store was built from.
    backend: &'static BackendDescriptor,
    /// Connected store.
    store: Box<dyn RecordStore>,
    /// Artifacts verified for this backend.
    artifacts: VerifiedArtifacts,
    /// License grant that admitted provisioning.
    grant: LicenseGrant,
    /// Health-check latency above which the store is degraded.
    degraded_after: Duration,
    /// Set once the store has been disconnected.
    closed: bool,
}

impl StoreHandle {
    /// Assembles a handle from provisioning results.
    pub(crate) fn new(
        backend: &'static BackendDescriptor,
        store: Box<dyn RecordStore>,
        artifacts: VerifiedArtifacts,
        grant: LicenseGrant,
        degraded_after: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            artifacts,
            grant,
            degraded_after,
            closed: false,
        }
    }

    /// Returns the backend identifier.
    #[must_use]
    pub const fn backend_id(&self) -> &'static str {
        self.backend.id()
    }

    /// Returns the backend family.
    #[must_use]
    pub const fn family(&self) -> BackendFamily {
        self.backend.family()
    }

    /// Returns the connected store.
    #[must_use]
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Returns the verified artifacts loaded for the backend.
    #[must_use]
    pub const fn artifacts(&self) -> &VerifiedArtifacts {
        &self.artifacts
    }

    /// Returns the license grant.
    #[must_use]
    pub const fn grant(&self) -> &LicenseGrant {
        &self.grant
    }

    /// Lists a collection lazily in storage id order.
    #[must_use]
    pub fn list(&self, collection: &str, filter: Filter) -> RecordCursor<'_> {
        RecordCursor::new(self.store.as_ref(), collection, filter)
    }

    /// Probes the store with the configured latency threshold.
    #[must_use]
    pub fn health_check(&self) -> HealthStatus {
        let status = self.store.health_check(self.degraded_after);
        match &status {
            HealthStatus::Ok => {}
            HealthStatus::Degraded {
                latency_ms,
            } => warn!(backend = self.backend_id(), latency_ms, "store health degraded"),
            HealthStatus::Down {
                reason,
            } => warn!(backend = self.backend_id(), reason = %reason, "store is down"),
        }
        status
    }

    /// Disconnects the store.
    ///
    /// The handle counts as closed before the engine is asked to disconnect,
    /// so a failed disconnect is reported here once and is not retried when
    /// the handle drops.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the engine fails to release resources.
    pub fn shutdown(mut self) -> Result<(), StoreError> {
        self.closed = true;
        self.store.disconnect()?;
        info!(backend = self.backend_id(), "store shut down");
        Ok(())
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.store.disconnect() {
            warn!(backend = self.backend_id(), error = %err, "store disconnect failed");
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use nextforge_core::BackendKind;
    use nextforge_core::BackoffPolicy;
    use nextforge_core::Record;
    use nextforge_core::RecordKey;
    use nextforge_license::LicenseGate;
    use nextforge_license::LicenseKey;
    use nextforge_license::LicenseService;
    use nextforge_license::LicenseVerdict;
    use nextforge_resolver::ResolverBuilder;

    use super::*;
    use crate::registry::lookup;

    /// Store whose disconnect always fails.
    struct FailingStore {
        /// Disconnect calls observed.
        disconnects: Arc<AtomicUsize>,
    }

    impl RecordStore for FailingStore {
        fn kind(&self) -> BackendKind {
            BackendKind::Document
        }

        fn get(&self, _collection: &str, _key: &RecordKey) -> Result<Record, StoreError> {
            Err(StoreError::Closed)
        }

        fn put(&self, _collection: &str, _record: &Record) -> Result<(), StoreError> {
            Err(StoreError::Closed)
        }

        fn delete(&self, _collection: &str, _key: &RecordKey) -> Result<(), StoreError> {
            Err(StoreError::Closed)
        }

        fn list_page(
            &self,
            _collection: &str,
            _filter: &Filter,
            _after: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<Record>, StoreError> {
            Ok(Vec::new())
        }

        fn count(&self, _collection: &str, _filter: &Filter) -> Result<u64, StoreError> {
            Ok(0)
        }

        fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn disconnect(&self) -> Result<(), StoreError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Backend("socket reset".to_string()))
        }
    }

    /// License service that always grants.
    struct Granting;

    impl LicenseService for Granting {
        fn verify(&self, _key: &LicenseKey) -> LicenseVerdict {
            LicenseVerdict::Granted {
                entitlements: BTreeSet::new(),
            }
        }
    }

    /// Builds a handle over a failing store and returns its disconnect counter.
    fn failing_handle() -> (StoreHandle, Arc<AtomicUsize>) {
        let cache = tempfile::tempdir().unwrap();
        let artifacts = ResolverBuilder::new(cache.path()).build().resolve(&[]).unwrap();
        let policy = BackoffPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1));
        let grant = LicenseGate::new(Arc::new(Granting), policy).verify(&LicenseKey::new("NF-UNIT")).unwrap();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let store = FailingStore {
            disconnects: Arc::clone(&disconnects),
        };
        let handle =
            StoreHandle::new(lookup("json").unwrap(), Box::new(store), artifacts, grant, Duration::from_millis(500));
        (handle, disconnects)
    }

    #[test]
    fn failed_shutdown_is_not_retried_on_drop() {
        let (handle, disconnects) = failing_handle();
        assert!(matches!(handle.shutdown(), Err(StoreError::Backend(_))));
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_disconnects_once() {
        let (handle, disconnects) = failing_handle();
        drop(handle);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }
}
