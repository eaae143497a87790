//! Collaborator seams the delivery layer consumes.
//!
//! Document metadata and artifact bytes live outside this crate; the
//! streamer only sees these traits. Paths are opaque strings chosen by the
//! storage backend.

use archivault_types::{Artifact, DocumentId, UserId};
use async_trait::async_trait;
use std::collections::HashMap;

/// Metadata the streamer needs about one document.
#[derive(Debug, Clone)]
pub struct DocumentView {
    pub id: DocumentId,
    pub owner_user_id: UserId,
    pub deleted: bool,
    pub encrypted: bool,
    /// Storage path per artifact; absent means the artifact was never
    /// generated for this document.
    pub artifact_paths: HashMap<Artifact, String>,
}

/// Looks up document metadata by id.
#[async_trait]
pub trait DocumentDirectory: Send + Sync {
    async fn document_view(&self, id: DocumentId) -> Option<DocumentView>;
}

/// Reads and writes raw artifact bytes.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    async fn read(&self, path: &str) -> std::io::Result<Vec<u8>>;

    /// Stores artifact bytes and returns the opaque path they landed at.
    async fn save(
        &self,
        owner: &UserId,
        document_id: DocumentId,
        artifact: Artifact,
        bytes: &[u8],
    ) -> std::io::Result<String>;
}
