// crates/nextforge-license/src/gate.rs
// ============================================================================
// Module: Nextforge License Gate Policy
// Description: Retry, fail-closed, and terminal-denial policy.
// Purpose: Decide whether provisioning may start.
// Dependencies: nextforge-core, tracing
// ============================================================================

//! ## Overview
//! [`LicenseGate::verify`] asks the service for a verdict and applies the
//! startup policy:
//! - `ServiceUnavailable` is retried with bounded exponential backoff. Once
//!   the attempt budget is spent the gate fails closed.
//! - `Denied` is returned immediately and remembered; later calls on the
//!   same gate return the denial without contacting the service.
//! - Cancellation is checked before each attempt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use nextforge_core::BackoffPolicy;
use nextforge_core::Cancellation;
use nextforge_core::Sleeper;
use nextforge_core::ThreadSleeper;
use thiserror::Error;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::service::LicenseKey;
use crate::service::LicenseService;
use crate::service::LicenseVerdict;

// ============================================================================
// SECTION: Results
// ============================================================================

/// Successful license verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseGrant {
    /// Granted entitlements.
    entitlements: BTreeSet<String>,
    /// Attempts used to obtain the grant.
    attempts: u32,
}

impl LicenseGrant {
    /// Returns the granted entitlements.
    #[must_use]
    pub const fn entitlements(&self) -> &BTreeSet<String> {
        &self.entitlements
    }

    /// Returns true when `entitlement` was granted.
    #[must_use]
    pub fn has(&self, entitlement: &str) -> bool {
        self.entitlements.contains(entitlement)
    }

    /// Returns the number of attempts used.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// License gate failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LicenseError {
    /// Authority denied the license.
    #[error("license denied: {reason}")]
    Denied {
        /// Reason reported by the authority.
        reason: String,
    },
    /// Authority stayed unavailable for every attempt.
    #[error("license service unavailable after {attempts} attempts: {detail}")]
    ServiceUnavailable {
        /// Attempts made.
        attempts: u32,
        /// Last failure detail.
        detail: String,
    },
    /// Verification was cancelled before a verdict was obtained.
    #[error("license verification cancelled")]
    Cancelled,
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// License gate applying retry and denial policy to a service.
pub struct LicenseGate {
    /// License authority client.
    service: Arc<dyn LicenseService>,
    /// Retry policy for unavailable services.
    backoff: BackoffPolicy,
    /// Delay implementation.
    sleeper: Arc<dyn Sleeper>,
    /// Cancellation token.
    cancellation: Cancellation,
    /// Remembered denial reason.
    denial: Mutex<Option<String>>,
}

impl LicenseGate {
    /// Creates a gate around `service`.
    #[must_use]
    pub fn new(service: Arc<dyn LicenseService>, backoff: BackoffPolicy) -> Self {
        Self {
            service,
            backoff,
            sleeper: Arc::new(ThreadSleeper),
            cancellation: Cancellation::new(),
            denial: Mutex::new(None),
        }
    }

    /// Replaces the sleeper used between retries.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replaces the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Verifies `key`.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Denied`] when the authority denies the key
    /// (now or earlier on this gate), [`LicenseError::ServiceUnavailable`]
    /// when every attempt failed, and [`LicenseError::Cancelled`] when
    /// cancellation was requested.
    pub fn verify(&self, key: &LicenseKey) -> Result<LicenseGrant, LicenseError> {
        if let Some(reason) = self.remembered_denial() {
            return Err(LicenseError::Denied {
                reason,
            });
        }
        let max_attempts = self.backoff.max_attempts();
        let mut attempt = 1;
        loop {
            if self.cancellation.is_cancelled() {
                return Err(LicenseError::Cancelled);
            }
            match self.service.verify(key) {
                LicenseVerdict::Granted { entitlements } => {
                    info!(attempt, entitlements = entitlements.len(), "license granted");
                    return Ok(LicenseGrant {
                        entitlements,
                        attempts: attempt,
                    });
                }
                LicenseVerdict::Denied { reason } => {
                    error!(reason = %reason, "license denied");
                    *self.denial.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.clone());
                    return Err(LicenseError::Denied {
                        reason,
                    });
                }
                LicenseVerdict::ServiceUnavailable { detail } if attempt < max_attempts => {
                    let delay = self.backoff.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        detail = %detail,
                        "license service unavailable; retrying"
                    );
                    self.sleeper.sleep(delay);
                    attempt += 1;
                }
                LicenseVerdict::ServiceUnavailable { detail } => {
                    error!(attempts = attempt, detail = %detail, "license service unavailable; failing closed");
                    return Err(LicenseError::ServiceUnavailable {
                        attempts: attempt,
                        detail,
                    });
                }
            }
        }
    }

    /// Returns the remembered denial reason, if any.
    fn remembered_denial(&self) -> Option<String> {
        self.denial.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use std::collections::VecDeque;
    use std::time::Duration;

    use nextforge_core::RecordingSleeper;

    use super::*;

    /// Service answering from a script and counting calls.
    struct ScriptedService {
        /// Remaining verdicts; the last one repeats.
        verdicts: Mutex<VecDeque<LicenseVerdict>>,
        /// Calls made.
        calls: Mutex<u32>,
    }

    impl ScriptedService {
        fn new(verdicts: Vec<LicenseVerdict>) -> Arc<Self> {
            Arc::new(Self {
                verdicts: Mutex::new(verdicts.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl LicenseService for ScriptedService {
        fn verify(&self, _key: &LicenseKey) -> LicenseVerdict {
            *self.calls.lock().unwrap() += 1;
            let mut verdicts = self.verdicts.lock().unwrap();
            if verdicts.len() > 1 { verdicts.pop_front().unwrap() } else { verdicts[0].clone() }
        }
    }

    fn unavailable() -> LicenseVerdict {
        LicenseVerdict::ServiceUnavailable {
            detail: "503".to_string(),
        }
    }

    fn granted() -> LicenseVerdict {
        LicenseVerdict::Granted {
            entitlements: BTreeSet::from(["storage".to_string()]),
        }
    }

    fn policy(attempts: u32) -> BackoffPolicy {
        BackoffPolicy::new(attempts, Duration::from_millis(250), Duration::from_secs(5))
    }

    #[test]
    fn unavailable_then_granted_uses_bounded_backoff() {
        let service = ScriptedService::new(vec![unavailable(), unavailable(), unavailable(), granted()]);
        let sleeper = RecordingSleeper::new();
        let gate = LicenseGate::new(service.clone(), policy(5)).with_sleeper(Arc::new(sleeper.clone()));
        let grant = gate.verify(&LicenseKey::new("k")).unwrap();
        assert_eq!(grant.attempts(), 4);
        assert!(grant.has("storage"));
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(250), Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[test]
    fn exhausted_attempts_fail_closed() {
        let service = ScriptedService::new(vec![unavailable()]);
        let gate = LicenseGate::new(service.clone(), policy(3)).with_sleeper(Arc::new(RecordingSleeper::new()));
        let err = gate.verify(&LicenseKey::new("k")).unwrap_err();
        assert!(matches!(err, LicenseError::ServiceUnavailable { attempts: 3, .. }));
        assert_eq!(service.calls(), 3);
    }

    #[test]
    fn denial_is_terminal_for_the_gate() {
        let service = ScriptedService::new(vec![
            LicenseVerdict::Denied {
                reason: "expired".to_string(),
            },
            granted(),
        ]);
        let gate = LicenseGate::new(service.clone(), policy(5)).with_sleeper(Arc::new(RecordingSleeper::new()));
        assert!(matches!(gate.verify(&LicenseKey::new("k")), Err(LicenseError::Denied { .. })));
        assert!(matches!(gate.verify(&LicenseKey::new("k")), Err(LicenseError::Denied { .. })));
        assert_eq!(service.calls(), 1);
    }

    #[test]
    fn cancellation_stops_before_first_attempt() {
        let service = ScriptedService::new(vec![granted()]);
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let gate = LicenseGate::new(service.clone(), policy(5)).with_cancellation(cancellation);
        assert_eq!(gate.verify(&LicenseKey::new("k")), Err(LicenseError::Cancelled));
        assert_eq!(service.calls(), 0);
    }
}
