//! Versioned on-disk envelopes for artifact payloads.
//!
//! Two incompatible formats exist in the field and both must decrypt:
//!
//! - Version 1: `[1][nonce:12][ciphertext || tag:16]`, AES-256-GCM under the
//!   DEK directly.
//! - Version 2: `[2][iv:16][ciphertext][hmac:32]`, AES-256-CBC with PKCS7
//!   padding plus encrypt-then-MAC. Subkeys are derived from the DEK via
//!   HMAC-SHA256 with the domain-separation labels `"enc"` and `"mac"`; the
//!   MAC covers `iv || ciphertext` and is verified before any CBC decryption
//!   is attempted.
//!
//! New writes always produce version 2. The version byte is the sole
//! discriminator; any other value is rejected.

use crate::error::{CryptoError, CryptoResult};
use crate::key::Dek;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Version byte for AES-GCM envelopes.
pub const ENVELOPE_V1: u8 = 1;
/// Version byte for AES-CBC + HMAC envelopes.
pub const ENVELOPE_V2: u8 = 2;

pub const GCM_NONCE_SIZE: usize = 12;
pub const GCM_TAG_SIZE: usize = 16;
pub const CBC_IV_SIZE: usize = 16;
pub const CBC_BLOCK_SIZE: usize = 16;
pub const MAC_SIZE: usize = 32;

const V1_MIN_SIZE: usize = 1 + GCM_NONCE_SIZE + GCM_TAG_SIZE;
const V2_MIN_SIZE: usize = 1 + CBC_IV_SIZE + CBC_BLOCK_SIZE + MAC_SIZE;

const SUBKEY_ENC_LABEL: &[u8] = b"enc";
const SUBKEY_MAC_LABEL: &[u8] = b"mac";

/// A parsed artifact envelope, discriminated by the leading version byte.
///
/// Modeled as a tagged union rather than runtime dispatch so that adding a
/// future version is a compile-time-checked change in `decrypt_artifact`.
#[derive(Clone, Debug)]
pub enum Envelope {
    V1 {
        nonce: [u8; GCM_NONCE_SIZE],
        /// `ciphertext || tag`.
        body: Vec<u8>,
    },
    V2 {
        iv: [u8; CBC_IV_SIZE],
        body: Vec<u8>,
        mac: [u8; MAC_SIZE],
    },
}

impl Envelope {
    /// Decodes an envelope from raw stored bytes, branching on the version
    /// byte. Truncated buffers and unknown versions are rejected.
    pub fn parse(bytes: &[u8]) -> CryptoResult<Self> {
        let Some(&version) = bytes.first() else {
            return Err(CryptoError::Truncated(0));
        };
        match version {
            ENVELOPE_V1 => {
                if bytes.len() < V1_MIN_SIZE {
                    return Err(CryptoError::Truncated(bytes.len()));
                }
                let mut nonce = [0u8; GCM_NONCE_SIZE];
                nonce.copy_from_slice(&bytes[1..1 + GCM_NONCE_SIZE]);
                Ok(Envelope::V1 {
                    nonce,
                    body: bytes[1 + GCM_NONCE_SIZE..].to_vec(),
                })
            }
            ENVELOPE_V2 => {
                if bytes.len() < V2_MIN_SIZE {
                    return Err(CryptoError::Truncated(bytes.len()));
                }
                let mut iv = [0u8; CBC_IV_SIZE];
                iv.copy_from_slice(&bytes[1..1 + CBC_IV_SIZE]);
                let mac_start = bytes.len() - MAC_SIZE;
                let mut mac = [0u8; MAC_SIZE];
                mac.copy_from_slice(&bytes[mac_start..]);
                Ok(Envelope::V2 {
                    iv,
                    body: bytes[1 + CBC_IV_SIZE..mac_start].to_vec(),
                    mac,
                })
            }
            other => Err(CryptoError::UnsupportedVersion(other)),
        }
    }

    pub fn version(&self) -> u8 {
        match self {
            Envelope::V1 { .. } => ENVELOPE_V1,
            Envelope::V2 { .. } => ENVELOPE_V2,
        }
    }

    /// Re-encodes the envelope into its on-disk byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Envelope::V1 { nonce, body } => {
                let mut out = Vec::with_capacity(1 + GCM_NONCE_SIZE + body.len());
                out.push(ENVELOPE_V1);
                out.extend_from_slice(nonce);
                out.extend_from_slice(body);
                out
            }
            Envelope::V2 { iv, body, mac } => {
                let mut out = Vec::with_capacity(1 + CBC_IV_SIZE + body.len() + MAC_SIZE);
                out.push(ENVELOPE_V2);
                out.extend_from_slice(iv);
                out.extend_from_slice(body);
                out.extend_from_slice(mac);
                out
            }
        }
    }
}

/// Derives a 32-byte subkey from the DEK with a domain-separation label.
fn derive_subkey(dek: &Dek, label: &[u8]) -> CryptoResult<Zeroizing<[u8; 32]>> {
    let mut hmac = <HmacSha256 as Mac>::new_from_slice(dek.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    hmac.update(label);
    Ok(Zeroizing::new(hmac.finalize().into_bytes().into()))
}

fn mac_over(mac_key: &[u8; 32], iv: &[u8], ciphertext: &[u8]) -> CryptoResult<[u8; MAC_SIZE]> {
    let mut hmac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    hmac.update(iv);
    hmac.update(ciphertext);
    Ok(hmac.finalize().into_bytes().into())
}

/// Encrypts an artifact payload under its DEK. New writes always produce a
/// version-2 envelope.
pub fn encrypt_artifact(plaintext: &[u8], dek: &Dek) -> CryptoResult<Vec<u8>> {
    let enc_key = derive_subkey(dek, SUBKEY_ENC_LABEL)?;
    let mac_key = derive_subkey(dek, SUBKEY_MAC_LABEL)?;

    let mut iv = [0u8; CBC_IV_SIZE];
    getrandom::getrandom(&mut iv).map_err(|e| CryptoError::Rng(e.to_string()))?;

    let ciphertext = Aes256CbcEnc::new((&*enc_key).into(), (&iv).into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let mac = mac_over(&mac_key, &iv, &ciphertext)?;

    Ok(Envelope::V2 {
        iv,
        body: ciphertext,
        mac,
    }
    .to_bytes())
}

/// Encrypts a payload in the legacy version-1 (AES-GCM) layout.
///
/// Kept for fixtures and for re-producing envelopes written by older
/// deployments; new artifact writes go through [`encrypt_artifact`].
pub fn encrypt_artifact_v1(plaintext: &[u8], dek: &Dek) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(dek.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut nonce = [0u8; GCM_NONCE_SIZE];
    getrandom::getrandom(&mut nonce).map_err(|e| CryptoError::Rng(e.to_string()))?;

    let body = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(Envelope::V1 { nonce, body }.to_bytes())
}

/// Decrypts an artifact envelope of either version.
///
/// Version 2 verifies the HMAC over `iv || ciphertext` before any CBC
/// decryption so a padding oracle is never exposed. Tag or MAC mismatches
/// fail closed as [`CryptoError::Integrity`].
pub fn decrypt_artifact(bytes: &[u8], dek: &Dek) -> CryptoResult<Vec<u8>> {
    match Envelope::parse(bytes)? {
        Envelope::V1 { nonce, body } => {
            let cipher = Aes256Gcm::new_from_slice(dek.as_bytes())
                .map_err(|_| CryptoError::Integrity)?;
            cipher
                .decrypt(Nonce::from_slice(&nonce), body.as_ref())
                .map_err(|_| CryptoError::Integrity)
        }
        Envelope::V2 { iv, body, mac } => {
            let mac_key = derive_subkey(dek, SUBKEY_MAC_LABEL)?;
            let mut verifier = <HmacSha256 as Mac>::new_from_slice(&*mac_key)
                .map_err(|_| CryptoError::Integrity)?;
            verifier.update(&iv);
            verifier.update(&body);
            verifier.verify_slice(&mac).map_err(|_| CryptoError::Integrity)?;

            let enc_key = derive_subkey(dek, SUBKEY_ENC_LABEL)?;
            Aes256CbcDec::new((&*enc_key).into(), (&iv).into())
                .decrypt_padded_vec_mut::<Pkcs7>(&body)
                .map_err(|_| CryptoError::Integrity)
        }
    }
}
