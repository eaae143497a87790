//! Search index boundary.
//!
//! The projection pushes the effective reader set for a document to whatever
//! search backend is wired in. Only non-owner readers are sent; the owner's
//! own visibility is handled by the indexer's ownership field.

use crate::error::SharingResult;
use archivault_types::{DocumentId, UserId};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Receives access updates for documents as sharing changes.
#[async_trait]
pub trait SearchIndexSink: Send + Sync {
    /// Replaces the set of users allowed to find `document_id` in search.
    async fn update_document_access(
        &self,
        document_id: DocumentId,
        allowed_user_ids: BTreeSet<UserId>,
    ) -> SharingResult<()>;
}

/// Sink that drops all updates, for deployments without a search backend.
pub struct NullIndexSink;

#[async_trait]
impl SearchIndexSink for NullIndexSink {
    async fn update_document_access(
        &self,
        _document_id: DocumentId,
        _allowed_user_ids: BTreeSet<UserId>,
    ) -> SharingResult<()> {
        Ok(())
    }
}
