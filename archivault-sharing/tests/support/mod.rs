//! Shared fixtures for sharing tests.

use archivault_sharing::{SearchIndexSink, SharingError, SharingResult};
use archivault_types::{DocumentId, UserId};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Mutex;

/// Index sink that records every push so tests can assert on what the
/// search backend would have seen.
#[derive(Default)]
pub struct RecordingIndexSink {
    pushes: Mutex<Vec<(DocumentId, BTreeSet<UserId>)>>,
}

impl RecordingIndexSink {
    pub fn pushes(&self) -> Vec<(DocumentId, BTreeSet<UserId>)> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn last_push_for(&self, document_id: DocumentId) -> Option<BTreeSet<UserId>> {
        self.pushes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| *id == document_id)
            .map(|(_, users)| users.clone())
    }
}

#[async_trait]
impl SearchIndexSink for RecordingIndexSink {
    async fn update_document_access(
        &self,
        document_id: DocumentId,
        allowed_user_ids: BTreeSet<UserId>,
    ) -> SharingResult<()> {
        self.pushes.lock().unwrap().push((document_id, allowed_user_ids));
        Ok(())
    }
}

/// Index sink whose pushes always fail.
pub struct FailingIndexSink;

#[async_trait]
impl SearchIndexSink for FailingIndexSink {
    async fn update_document_access(
        &self,
        _document_id: DocumentId,
        _allowed_user_ids: BTreeSet<UserId>,
    ) -> SharingResult<()> {
        Err(SharingError::Index("index unavailable".to_string()))
    }
}
