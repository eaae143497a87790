//! Keystore error types.

use thiserror::Error;

/// Result type for keystore operations.
pub type KeystoreResult<T> = Result<T, KeystoreError>;

/// Errors that can occur reading or appending key records.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("storage error: {0}")]
    Storage(#[from] duckdb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid key record: {0}")]
    InvalidRecord(String),

    #[error("corrupt key record row: {0}")]
    Corrupt(String),
}
