// crates/nextforge-core/src/core/hashing.rs
// ============================================================================
// Module: Nextforge Content Hashing
// Description: Content digests for artifact integrity verification.
// Purpose: Compute and parse the hashes artifacts are pinned to.
// Dependencies: serde, sha2
// ============================================================================

//! ## Overview
//! Artifacts are verified by hashing their raw bytes and comparing the
//! lowercase hex digest against the pinned expectation. Digests parsed from
//! configuration are normalized to lowercase so that comparison is exact.
//!
//! Security posture: hashing is the integrity boundary for downloaded driver
//! binaries; a digest that does not parse is rejected rather than ignored.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Algorithm
// ============================================================================

/// Supported hash algorithms for artifact verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 hashing.
    Sha256,
}

impl HashAlgorithm {
    /// Returns the hex digest length produced by the algorithm.
    #[must_use]
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
        }
    }

    /// Returns the stable label for the algorithm.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

/// Default hash algorithm for Nextforge artifacts.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// Content hash representation.
///
/// # Invariants
/// - `value` is lowercase hex of exactly `algorithm.hex_len()` characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashDigest {
    /// Hash algorithm identifier.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

impl HashDigest {
    /// Creates a new digest from raw bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            value: hex_encode(bytes),
        }
    }

    /// Parses a hex digest for the given algorithm.
    ///
    /// Uppercase input is accepted and normalized to lowercase.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the input has the wrong length or contains
    /// non-hex characters.
    pub fn parse(algorithm: HashAlgorithm, hex: &str) -> Result<Self, HashError> {
        let trimmed = hex.trim();
        if trimmed.len() != algorithm.hex_len() {
            return Err(HashError::InvalidLength {
                expected: algorithm.hex_len(),
                actual: trimmed.len(),
            });
        }
        if !trimmed.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(trimmed.to_string()));
        }
        Ok(Self {
            algorithm,
            value: trimmed.to_ascii_lowercase(),
        })
    }

    /// Parses a SHA-256 hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the input is not a valid SHA-256 hex digest.
    pub fn parse_sha256(hex: &str) -> Result<Self, HashError> {
        Self::parse(HashAlgorithm::Sha256, hex)
    }

    /// Returns true when `bytes` hash to this digest.
    #[must_use]
    pub fn matches(&self, bytes: &[u8]) -> bool {
        hash_bytes(self.algorithm, bytes) == *self
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.value)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when parsing digests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// Digest length does not match the algorithm.
    #[error("digest must be {expected} hex characters, found {actual}")]
    InvalidLength {
        /// Expected number of hex characters.
        expected: usize,
        /// Actual number of characters supplied.
        actual: usize,
    },
    /// Digest contains non-hex characters.
    #[error("digest is not valid hex: {0}")]
    InvalidHex(String),
}

// ============================================================================
// SECTION: Hashing
// ============================================================================

/// Computes a hash digest over raw bytes.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let digest = hasher.finalize();
            HashDigest::new(HashAlgorithm::Sha256, &digest)
        }
    }
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::*;

    #[test]
    fn sha256_of_empty_input_matches_known_vector() {
        let digest = hash_bytes(HashAlgorithm::Sha256, b"");
        assert_eq!(
            digest.value,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn parse_normalizes_uppercase_hex() {
        let upper = "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855";
        let digest = HashDigest::parse_sha256(upper).unwrap();
        assert!(digest.matches(b""));
    }

    #[test]
    fn parse_rejects_short_and_non_hex_input() {
        assert!(matches!(
            HashDigest::parse_sha256("abc"),
            Err(HashError::InvalidLength { expected: 64, actual: 3 })
        ));
        let bad = "z".repeat(64);
        assert!(matches!(HashDigest::parse_sha256(&bad), Err(HashError::InvalidHex(_))));
    }

    #[test]
    fn matches_detects_single_byte_change() {
        let digest = hash_bytes(HashAlgorithm::Sha256, b"driver-bytes");
        assert!(digest.matches(b"driver-bytes"));
        assert!(!digest.matches(b"driver-bytez"));
    }
}
