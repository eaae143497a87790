//! Artifact streamer: the read path from a document id to plaintext bytes.
//!
//! Every public entry point collapses failures to [`NotFound`]. The
//! encrypted path parses the envelope before touching the key store, so a
//! malformed blob never costs a key lookup, then resolves the newest key
//! record for the artifact, unwraps the DEK under the deployment master
//! key, and decrypts.

use crate::collaborators::{ArtifactStorage, DocumentDirectory, DocumentView};
use crate::error::{collapse, DeliveryError, DeliveryResult, NotFound};
use archivault_crypto::{decrypt_artifact, unwrap_dek, Envelope, MasterKey};
use archivault_keystore::KeyRecordStore;
use archivault_sharing::ExternalShareManager;
use archivault_tokens::AccessTokenService;
use archivault_types::{Artifact, DocumentId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Cache header for delivered artifacts; they are immutable once written.
pub const CACHE_CONTROL_IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// `Expires` header value one year after `now`, in RFC 7231 format.
pub fn expires_header(now: DateTime<Utc>) -> String {
    (now + chrono::Duration::days(365))
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Content type served for an artifact kind.
pub fn content_type(artifact: Artifact) -> &'static str {
    match artifact {
        Artifact::Thumb => "image/webp",
        Artifact::Metadata => "application/json",
        Artifact::File | Artifact::Preview | Artifact::Archive => "application/pdf",
    }
}

/// Delivery-wide settings.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// When set, unencrypted documents are not served at all.
    pub require_encryption: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            require_encryption: false,
        }
    }
}

/// Plaintext artifact bytes plus the content type to serve them with.
#[derive(Debug, Clone)]
pub struct ArtifactPayload {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Resolves a document and artifact to deliverable plaintext.
pub struct ArtifactStreamer {
    directory: Arc<dyn DocumentDirectory>,
    storage: Arc<dyn ArtifactStorage>,
    keys: KeyRecordStore,
    kek: MasterKey,
    tokens: AccessTokenService,
    externals: ExternalShareManager,
    config: DeliveryConfig,
}

impl ArtifactStreamer {
    pub fn new(
        directory: Arc<dyn DocumentDirectory>,
        storage: Arc<dyn ArtifactStorage>,
        keys: KeyRecordStore,
        kek: MasterKey,
        tokens: AccessTokenService,
        externals: ExternalShareManager,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            directory,
            storage,
            keys,
            kek,
            tokens,
            externals,
            config,
        }
    }

    /// Streams an artifact for an already-authorized caller.
    pub async fn get_artifact(
        &self,
        document_id: DocumentId,
        artifact: Artifact,
    ) -> Result<ArtifactPayload, NotFound> {
        collapse(self.fetch(document_id, artifact).await)
    }

    /// Streams an artifact gated by a signed artifact token.
    pub async fn get_artifact_with_token(
        &self,
        token: &str,
    ) -> Result<ArtifactPayload, NotFound> {
        collapse(self.fetch_with_token(token).await)
    }

    /// Streams the artifact behind an external share token, anonymously.
    pub async fn get_external_artifact(
        &self,
        token: &str,
    ) -> Result<ArtifactPayload, NotFound> {
        collapse(self.fetch_external(token).await)
    }

    async fn fetch_with_token(&self, token: &str) -> DeliveryResult<ArtifactPayload> {
        let (document_id, artifact) = self
            .tokens
            .validate_artifact_token(token)
            .ok_or(DeliveryError::InvalidToken)?;
        self.fetch(document_id, artifact).await
    }

    async fn fetch_external(&self, token: &str) -> DeliveryResult<ArtifactPayload> {
        let (share_id, _expires_at) = self
            .tokens
            .validate_share_token(token)
            .ok_or(DeliveryError::InvalidToken)?;
        let share = self
            .externals
            .get(share_id, Utc::now())?
            .ok_or(DeliveryError::ShareUnavailable)?;
        self.fetch(share.document_id, share.artifact).await
    }

    async fn fetch(
        &self,
        document_id: DocumentId,
        artifact: Artifact,
    ) -> DeliveryResult<ArtifactPayload> {
        let view = self
            .directory
            .document_view(document_id)
            .await
            .ok_or(DeliveryError::MissingDocument)?;
        if view.deleted {
            return Err(DeliveryError::Deleted);
        }
        if self.config.require_encryption && !view.encrypted {
            return Err(DeliveryError::EncryptionRequired);
        }

        let path = view
            .artifact_paths
            .get(&artifact)
            .ok_or(DeliveryError::MissingPath(artifact))?;
        let bytes = self.storage.read(path).await?;

        let bytes = if view.encrypted {
            self.decrypt(&view, artifact, &bytes)?
        } else {
            bytes
        };

        debug!(document_id = %document_id, %artifact, size = bytes.len(), "artifact delivered");
        Ok(ArtifactPayload {
            bytes,
            content_type: content_type(artifact),
        })
    }

    /// Envelope validation happens before the key lookup so malformed blobs
    /// fail without touching the key store.
    fn decrypt(
        &self,
        view: &DocumentView,
        artifact: Artifact,
        envelope_bytes: &[u8],
    ) -> DeliveryResult<Vec<u8>> {
        Envelope::parse(envelope_bytes)?;

        let record = self
            .keys
            .latest_for_artifact(view.id, artifact)?
            .ok_or(DeliveryError::MissingKeyRecord(artifact))?;
        let dek = unwrap_dek(&record.wrapped_dek, &record.wrap_nonce, &self.kek, artifact)?;
        Ok(decrypt_artifact(envelope_bytes, &dek)?)
    }
}
