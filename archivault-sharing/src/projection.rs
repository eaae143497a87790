//! Access projection: keeps the per-document reader set current and mirrors
//! it to the search index.
//!
//! Additions are incremental (union in the new readers). Removals never
//! subtract from the stored set: the effective set is rebuilt from the
//! owner, the remaining direct users, and the live membership of the
//! remaining groups, so membership drift between updates cannot leave a
//! stale reader behind.
//!
//! Index pushes are best-effort. The view is persisted first; a failed push
//! is logged and the stored view remains the source of truth for the next
//! reconciliation.

use crate::error::SharingResult;
use crate::index::SearchIndexSink;
use crate::store::SharingStore;
use crate::types::{DocumentAccessView, DocumentShare};
use archivault_types::{ShareTarget, UserId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maintains [`DocumentAccessView`] rows in response to share changes.
#[derive(Clone)]
pub struct AccessProjection {
    store: SharingStore,
    index: Arc<dyn SearchIndexSink>,
}

impl AccessProjection {
    pub fn new(store: SharingStore, index: Arc<dyn SearchIndexSink>) -> Self {
        Self { store, index }
    }

    /// Folds a newly created share into the document's access view.
    pub async fn add_share(&self, share: &DocumentShare) -> SharingResult<()> {
        let mut view = match self.store.view(share.document_id)? {
            Some(view) => view,
            None => DocumentAccessView::new(share.document_id, share.owner_user_id.clone()),
        };

        // The owner is an effective reader on every update, not only at
        // view creation.
        view.effective_user_ids.insert(view.owner_user_id.clone());

        match &share.target {
            ShareTarget::User(user) => {
                view.direct_user_ids.insert(user.clone());
                view.effective_user_ids.insert(user.clone());
            }
            ShareTarget::Group(group_id) => {
                view.group_ids.insert(*group_id);
                let members = self.store.group_members(*group_id)?;
                view.effective_user_ids.extend(members);
            }
        }

        self.store.upsert_view(&view)?;
        debug!(
            document_id = %view.id,
            readers = view.effective_user_ids.len(),
            "access view updated after share"
        );
        self.push(&view).await;
        Ok(())
    }

    /// Removes a deleted share's target and rebuilds the effective set.
    ///
    /// A no-op when the document has no view or the target was never in it.
    pub async fn remove_share(&self, share: &DocumentShare) -> SharingResult<()> {
        let mut view = match self.store.view(share.document_id)? {
            Some(view) => view,
            None => return Ok(()),
        };

        let changed = match &share.target {
            ShareTarget::User(user) => view.direct_user_ids.remove(user),
            ShareTarget::Group(group_id) => view.group_ids.remove(group_id),
        };
        if !changed {
            return Ok(());
        }

        view.effective_user_ids = self.recompute(&view)?;
        self.store.upsert_view(&view)?;
        debug!(
            document_id = %view.id,
            readers = view.effective_user_ids.len(),
            "access view rebuilt after unshare"
        );
        self.push(&view).await;
        Ok(())
    }

    /// Full rebuild: owner plus direct users plus current group members.
    fn recompute(&self, view: &DocumentAccessView) -> SharingResult<BTreeSet<UserId>> {
        let mut effective = BTreeSet::from([view.owner_user_id.clone()]);
        effective.extend(view.direct_user_ids.iter().cloned());
        for group_id in &view.group_ids {
            effective.extend(self.store.group_members(*group_id)?);
        }
        Ok(effective)
    }

    async fn push(&self, view: &DocumentAccessView) {
        let mut allowed = view.effective_user_ids.clone();
        allowed.remove(&view.owner_user_id);
        if let Err(e) = self
            .index
            .update_document_access(view.id, allowed)
            .await
        {
            warn!(document_id = %view.id, error = %e, "search index push failed; view persisted");
        }
    }
}
