//! Delivery error taxonomy and the NotFound collapse boundary.
//!
//! Internally every failure mode stays distinct so operators can see what
//! actually went wrong. Externally, every delivery failure is the same
//! `NotFound`: an untrusted caller cannot tell a missing document from a
//! wrong owner, a forged token, a corrupt envelope, or a missing key
//! record. The collapse happens in exactly one place, [`collapse`], which
//! logs the rich error before discarding it.

use archivault_types::Artifact;
use thiserror::Error;
use tracing::warn;

/// The only delivery failure an untrusted caller ever sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotFound;

impl std::fmt::Display for NotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("not found")
    }
}

impl std::error::Error for NotFound {}

pub(crate) type DeliveryResult<T> = Result<T, DeliveryError>;

/// Internal delivery failures, logged server-side with full detail.
#[derive(Debug, Error)]
pub(crate) enum DeliveryError {
    #[error("document does not exist")]
    MissingDocument,

    #[error("document is soft-deleted")]
    Deleted,

    #[error("encryption is required but the document is not encrypted")]
    EncryptionRequired,

    #[error("no stored path for artifact {0}")]
    MissingPath(Artifact),

    #[error("no key record for artifact {0}")]
    MissingKeyRecord(Artifact),

    #[error("token validation failed")]
    InvalidToken,

    #[error("external share is missing, revoked, or expired")]
    ShareUnavailable,

    #[error("storage read failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("export serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("export archive failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Keystore(#[from] archivault_keystore::KeystoreError),

    #[error(transparent)]
    Crypto(#[from] archivault_crypto::CryptoError),

    #[error(transparent)]
    Sharing(#[from] archivault_sharing::SharingError),
}

/// Sanitizes an internal delivery result at the trust boundary.
pub(crate) fn collapse<T>(result: DeliveryResult<T>) -> Result<T, NotFound> {
    result.map_err(|e| {
        warn!(error = %e, "artifact delivery failed, returning not found");
        NotFound
    })
}
