//! Sharing error types.
//!
//! Validation and authorization failures are deliberately distinct: a
//! validation error means the request was malformed, an authorization error
//! means a well-formed request the caller may not perform. Both are checked
//! before any mutation so a rejected request never leaves partial writes.

use thiserror::Error;

/// Result type for sharing operations.
pub type SharingResult<T> = Result<T, SharingError>;

/// Errors that can occur in share, group, rule, and projection operations.
#[derive(Debug, Error)]
pub enum SharingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not permitted: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] duckdb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search index error: {0}")]
    Index(String),

    #[error("corrupt sharing row: {0}")]
    Corrupt(String),
}
