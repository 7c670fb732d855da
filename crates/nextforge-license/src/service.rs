// crates/nextforge-license/src/service.rs
// ============================================================================
// Module: Nextforge License Service
// Description: License service trait and HTTP client.
// Purpose: Ask the license authority for a verdict on one key.
// Dependencies: reqwest, serde, serde_json, url
// ============================================================================

//! ## Overview
//! [`HttpLicenseService`] POSTs `{"key": ..., "product": ...}` as JSON to the
//! configured endpoint and maps the answer onto a [`LicenseVerdict`]:
//! - 200 with `{"granted": true, "entitlements": [...]}` is granted.
//! - 200 with `{"granted": false, "reason": ...}` is denied.
//! - 408, 429, 5xx, transport errors, timeouts, and unreadable bodies are
//!   service-unavailable.
//! - Any other status is denied.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum accepted response body size.
const MAX_RESPONSE_BYTES: u64 = 64 * 1024;

// ============================================================================
// SECTION: Verdicts
// ============================================================================

/// License key wrapper that never renders its value.
#[derive(Clone, PartialEq, Eq)]
pub struct LicenseKey(String);

impl LicenseKey {
    /// Wraps a key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the raw key for transmission.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LicenseKey(<redacted>)")
    }
}

/// Answer from the license authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseVerdict {
    /// License is valid.
    Granted {
        /// Capabilities unlocked by the license.
        entitlements: BTreeSet<String>,
    },
    /// License is invalid, expired, or revoked.
    Denied {
        /// Reason reported by the authority.
        reason: String,
    },
    /// Authority could not be reached or answered with a retryable failure.
    ServiceUnavailable {
        /// Failure detail.
        detail: String,
    },
}

/// License authority client.
pub trait LicenseService: Send + Sync {
    /// Requests a verdict for `key`.
    fn verify(&self, key: &LicenseKey) -> LicenseVerdict;
}

// ============================================================================
// SECTION: HTTP Service
// ============================================================================

/// Verification request body.
#[derive(Serialize)]
struct VerifyRequest<'a> {
    /// License key.
    key: &'a str,
    /// Product identifier.
    product: &'a str,
}

/// Verification response body.
#[derive(Deserialize)]
struct VerifyResponse {
    /// Whether the license is valid.
    granted: bool,
    /// Granted entitlements.
    #[serde(default)]
    entitlements: Vec<String>,
    /// Denial reason.
    #[serde(default)]
    reason: Option<String>,
}

/// HTTP(S) license service client.
#[derive(Debug, Clone)]
pub struct HttpLicenseService {
    /// Blocking client with redirects disabled.
    client: Client,
    /// Verification endpoint.
    endpoint: Url,
    /// Product identifier sent with each request.
    product: String,
}

impl HttpLicenseService {
    /// Creates a client for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns a message when the endpoint is not an http(s) URL or the
    /// client cannot be built.
    pub fn new(endpoint: &str, product: impl Into<String>, timeout: Duration) -> Result<Self, String> {
        let endpoint = Url::parse(endpoint).map_err(|err| format!("invalid license endpoint: {err}"))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(format!("unsupported license endpoint scheme: {}", endpoint.scheme()));
        }
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|err| err.to_string())?;
        Ok(Self {
            client,
            endpoint,
            product: product.into(),
        })
    }
}

impl LicenseService for HttpLicenseService {
    fn verify(&self, key: &LicenseKey) -> LicenseVerdict {
        let body = match serde_json::to_vec(&VerifyRequest {
            key: key.expose(),
            product: &self.product,
        }) {
            Ok(body) => body,
            Err(err) => return unavailable(err.to_string()),
        };
        let response = match self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
        {
            Ok(response) => response,
            Err(err) if err.is_timeout() => return unavailable(format!("license request timed out: {err}")),
            Err(err) => return unavailable(err.to_string()),
        };
        let status = response.status();
        if is_retryable(status) {
            return unavailable(format!("license service status {status}"));
        }
        let mut bytes = Vec::new();
        if let Err(err) = response.take(MAX_RESPONSE_BYTES + 1).read_to_end(&mut bytes) {
            return unavailable(err.to_string());
        }
        if !u64::try_from(bytes.len()).is_ok_and(|len| len <= MAX_RESPONSE_BYTES) {
            return unavailable("license response exceeds size limit".to_string());
        }
        if !status.is_success() {
            return LicenseVerdict::Denied {
                reason: denial_reason(&bytes).unwrap_or_else(|| format!("license service status {status}")),
            };
        }
        match serde_json::from_slice::<VerifyResponse>(&bytes) {
            Ok(parsed) if parsed.granted => LicenseVerdict::Granted {
                entitlements: parsed.entitlements.into_iter().collect(),
            },
            Ok(parsed) => LicenseVerdict::Denied {
                reason: parsed.reason.unwrap_or_else(|| "license denied".to_string()),
            },
            Err(err) => unavailable(format!("malformed license response: {err}")),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a service-unavailable verdict.
const fn unavailable(detail: String) -> LicenseVerdict {
    LicenseVerdict::ServiceUnavailable {
        detail,
    }
}

/// Returns true for statuses that mean "try again later".
fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Extracts a `reason` from an error body when present.
fn denial_reason(bytes: &[u8]) -> Option<String> {
    serde_json::from_slice::<VerifyResponse>(bytes).ok().and_then(|parsed| parsed.reason)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::*;

    #[test]
    fn key_debug_is_redacted() {
        let key = LicenseKey::new("SECRET-123");
        assert!(!format!("{key:?}").contains("SECRET"));
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable(StatusCode::FORBIDDEN));
    }

    #[test]
    fn rejects_non_http_endpoints() {
        assert!(HttpLicenseService::new("ftp://license", "nextforge", Duration::from_secs(1)).is_err());
        HttpLicenseService::new("https://license.example.com/verify", "nextforge", Duration::from_secs(1))
            .unwrap();
    }
}
