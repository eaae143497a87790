//! Envelope encryption for Archivault artifacts.
//!
//! Implements the two-tier key scheme protecting stored artifacts:
//!
//! 1. **KEK** (key-encryption key): one static 256-bit master key per
//!    deployment, used only to wrap per-artifact DEKs.
//! 2. **DEK** (data-encryption key): a random key per artifact, wrapped
//!    under the KEK with AES-256-GCM and an artifact-bound AAD.
//!
//! Artifact payloads themselves are stored in versioned envelopes; see
//! [`envelope`] for the two on-disk formats. All operations are synchronous,
//! CPU-bound, and free of shared mutable state, so they are safe to call
//! concurrently.

mod envelope;
mod error;
mod key;
mod wrap;

pub use envelope::{
    decrypt_artifact, encrypt_artifact, encrypt_artifact_v1, Envelope, CBC_IV_SIZE,
    ENVELOPE_V1, ENVELOPE_V2, GCM_NONCE_SIZE, GCM_TAG_SIZE, MAC_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{Dek, MasterKey, KEY_SIZE};
pub use wrap::{unwrap_dek, wrap_dek, WrappedDek, WRAPPED_DEK_SIZE, WRAP_NONCE_SIZE};
