//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in envelope crypto operations.
///
/// Variants stay distinguishable for server-side logging; the delivery
/// boundary collapses all of them to a uniform not-found outcome before
/// anything reaches an untrusted caller.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid master key: {0}")]
    MasterKey(String),

    #[error("integrity check failed (wrong key or tampered data)")]
    Integrity,

    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    #[error("envelope too short: {0} bytes")]
    Truncated(usize),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("system rng failure: {0}")]
    Rng(String),
}
