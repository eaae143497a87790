//! DEK wrapping under the deployment master key.
//!
//! Each artifact's DEK is AES-256-GCM encrypted under the KEK with a fresh
//! 12-byte nonce. The AAD binds the wrap to the artifact kind (`"DEK:file"`,
//! `"DEK:thumb"`, ...) so a key record for one artifact can never be replayed
//! against another.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{Dek, MasterKey, KEY_SIZE};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use archivault_types::Artifact;

/// Nonce length for the GCM wrap.
pub const WRAP_NONCE_SIZE: usize = 12;

/// Wrapped DEK length: 32-byte key ciphertext plus the 16-byte GCM tag.
pub const WRAPPED_DEK_SIZE: usize = KEY_SIZE + 16;

/// A DEK sealed under the KEK, ready to persist in a key record.
#[derive(Clone, Debug)]
pub struct WrappedDek {
    /// `ciphertext || tag`, always [`WRAPPED_DEK_SIZE`] bytes.
    pub wrapped: Vec<u8>,
    /// GCM nonce used for the wrap, stored alongside.
    pub nonce: [u8; WRAP_NONCE_SIZE],
}

fn wrap_aad(artifact: Artifact) -> Vec<u8> {
    format!("DEK:{artifact}").into_bytes()
}

/// Seals a DEK under the KEK, bound to the given artifact.
pub fn wrap_dek(dek: &Dek, kek: &MasterKey, artifact: Artifact) -> CryptoResult<WrappedDek> {
    let cipher = Aes256Gcm::new_from_slice(kek.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut nonce = [0u8; WRAP_NONCE_SIZE];
    getrandom::getrandom(&mut nonce).map_err(|e| CryptoError::Rng(e.to_string()))?;

    let aad = wrap_aad(artifact);
    let wrapped = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: dek.as_bytes(),
                aad: &aad,
            },
        )
        .map_err(|e| CryptoError::Encryption(format!("DEK wrap failed: {e}")))?;

    debug_assert_eq!(wrapped.len(), WRAPPED_DEK_SIZE);
    Ok(WrappedDek { wrapped, nonce })
}

/// Opens a wrapped DEK. Fails closed on any tag mismatch, wrong artifact
/// binding, or malformed input; no partial plaintext is ever returned.
pub fn unwrap_dek(
    wrapped: &[u8],
    nonce: &[u8; WRAP_NONCE_SIZE],
    kek: &MasterKey,
    artifact: Artifact,
) -> CryptoResult<Dek> {
    if wrapped.len() != WRAPPED_DEK_SIZE {
        return Err(CryptoError::Integrity);
    }

    let cipher = Aes256Gcm::new_from_slice(kek.as_bytes())
        .map_err(|_| CryptoError::Integrity)?;

    let aad = wrap_aad(artifact);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: wrapped,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::Integrity)?;

    Dek::from_slice(&plaintext)
}
