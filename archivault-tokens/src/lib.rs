//! Signed, time-bounded access tokens gating artifact delivery.
//!
//! Two token kinds share one scheme (HMAC-SHA256 under the deployment
//! master key, base64-encoded `payload|signature`):
//!
//! - Artifact tokens: `documentId|artifact|expiryUnixSeconds`
//! - Share tokens: `S|shareId|expiryUnixSeconds`
//!
//! The literal `"S"` leading field is a hard discriminator: a share token
//! presented to the artifact validator fails to parse as a document id, and
//! an artifact token presented to the share validator fails the literal
//! check, so the kinds can never be confused.
//!
//! Validation is silent by design: every malformed, forged, mis-typed, or
//! expired token yields `None`. Callers treat all of them as "not found";
//! no failure detail crosses the trust boundary.

use archivault_crypto::MasterKey;
use archivault_types::{Artifact, DocumentId, ShareId};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const SHARE_DISCRIMINATOR: &str = "S";

/// Issues and validates artifact and share access tokens.
///
/// Holds only the immutable master key; safe to share across request
/// handlers.
pub struct AccessTokenService {
    key: MasterKey,
}

impl AccessTokenService {
    pub fn new(key: MasterKey) -> Self {
        Self { key }
    }

    fn signature(&self, payload: &str) -> Vec<u8> {
        // HMAC-SHA256 accepts keys of any length; this cannot fail for a
        // 32-byte master key.
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .expect("HMAC-SHA256 accepts any key length");
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn encode(&self, payload: &str) -> String {
        let signature = BASE64.encode(self.signature(payload));
        BASE64.encode(format!("{payload}|{signature}"))
    }

    /// Decodes a token, checks the field count, and verifies the signature
    /// over everything before the final field. Returns the payload fields.
    fn verify(&self, token: &str, expected_fields: usize) -> Option<Vec<String>> {
        let decoded = BASE64.decode(token).ok()?;
        let text = String::from_utf8(decoded).ok()?;
        let fields: Vec<&str> = text.split('|').collect();
        if fields.len() != expected_fields {
            return None;
        }

        let payload = fields[..expected_fields - 1].join("|");
        let provided = BASE64.decode(fields[expected_fields - 1]).ok()?;
        let computed = self.signature(&payload);
        if !bool::from(computed.as_slice().ct_eq(provided.as_slice())) {
            return None;
        }

        Some(fields.into_iter().map(str::to_string).collect())
    }

    fn check_expiry(field: &str) -> Option<DateTime<Utc>> {
        let expiry: i64 = field.parse().ok()?;
        let expires_at = DateTime::from_timestamp(expiry, 0)?;
        if expires_at <= Utc::now() {
            return None;
        }
        Some(expires_at)
    }

    /// Issues a token granting delivery of one artifact of one document
    /// until `expires_at`.
    pub fn issue_artifact_token(
        &self,
        document_id: DocumentId,
        artifact: Artifact,
        expires_at: DateTime<Utc>,
    ) -> String {
        let payload = format!("{document_id}|{artifact}|{}", expires_at.timestamp());
        self.encode(&payload)
    }

    /// Validates an artifact token. `None` for anything malformed, forged,
    /// expired, or of the wrong kind.
    pub fn validate_artifact_token(&self, token: &str) -> Option<(DocumentId, Artifact)> {
        let fields = self.verify(token, 4)?;
        Self::check_expiry(&fields[2])?;
        let document_id: DocumentId = fields[0].parse().ok()?;
        let artifact: Artifact = fields[1].parse().ok()?;
        Some((document_id, artifact))
    }

    /// Issues a token for anonymous delivery through an external share.
    pub fn issue_share_token(&self, share_id: ShareId, expires_at: DateTime<Utc>) -> String {
        let payload = format!(
            "{SHARE_DISCRIMINATOR}|{share_id}|{}",
            expires_at.timestamp()
        );
        self.encode(&payload)
    }

    /// Validates a share token, returning the share id and its expiry.
    pub fn validate_share_token(&self, token: &str) -> Option<(ShareId, DateTime<Utc>)> {
        let fields = self.verify(token, 4)?;
        if fields[0] != SHARE_DISCRIMINATOR {
            return None;
        }
        let expires_at = Self::check_expiry(&fields[2])?;
        let share_id: ShareId = fields[1].parse().ok()?;
        Some((share_id, expires_at))
    }
}
