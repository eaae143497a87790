//! Share, group, and automation-rule operations.
//!
//! Every mutation validates and authorizes before touching storage, so a
//! rejected call leaves no partial state. The projection runs after the
//! write and is what makes a grant visible to search.

use crate::error::{SharingError, SharingResult};
use crate::projection::AccessProjection;
use crate::store::SharingStore;
use crate::types::{DocumentShare, RuleScope, ShareAutomationRule, ShareGroup};
use crate::StopSignal;
use archivault_types::{
    DocumentId, GroupId, PermissionSet, RuleId, ShareId, ShareTarget, UserId,
};
use chrono::Utc;
use std::collections::BTreeSet;
use tracing::info;

/// Owner-facing entry point for sharing mutations.
#[derive(Clone)]
pub struct ShareService {
    store: SharingStore,
    projection: AccessProjection,
}

impl ShareService {
    pub fn new(store: SharingStore, projection: AccessProjection) -> Self {
        Self { store, projection }
    }

    pub fn store(&self) -> &SharingStore {
        &self.store
    }

    /// Grants `target` access to a document on behalf of its owner.
    pub async fn create_share(
        &self,
        document_id: DocumentId,
        owner: &UserId,
        target: ShareTarget,
        permissions: PermissionSet,
    ) -> SharingResult<DocumentShare> {
        self.validate_target(owner, &target)?;

        let document = self
            .store
            .document(document_id)?
            .filter(|d| !d.deleted)
            .ok_or_else(|| SharingError::NotFound(format!("document {document_id}")))?;
        if &document.owner_user_id != owner {
            return Err(SharingError::Authorization(
                "only the document owner can share it".to_string(),
            ));
        }

        if self.store.share_for_target(document_id, &target)?.is_some() {
            return Err(SharingError::Validation(
                "target already has a share for this document".to_string(),
            ));
        }

        let share = DocumentShare {
            id: ShareId::new(),
            document_id,
            owner_user_id: owner.clone(),
            target,
            shared_at: Utc::now(),
            granted_by: owner.clone(),
            permissions: permissions.normalized(),
        };
        self.store.insert_share(&share)?;
        self.projection.add_share(&share).await?;
        info!(share_id = %share.id, document_id = %document_id, "share created");
        Ok(share)
    }

    /// Revokes a share. Only the granting owner may do this.
    pub async fn delete_share(&self, share_id: ShareId, owner: &UserId) -> SharingResult<()> {
        let share = self
            .store
            .share(share_id)?
            .ok_or_else(|| SharingError::NotFound(format!("share {share_id}")))?;
        if &share.owner_user_id != owner {
            return Err(SharingError::Authorization(
                "only the granting owner can revoke a share".to_string(),
            ));
        }

        self.store.delete_share(share_id)?;
        self.projection.remove_share(&share).await?;
        info!(share_id = %share_id, document_id = %share.document_id, "share revoked");
        Ok(())
    }

    // ── groups ──────────────────────────────────────────────────

    pub fn create_group(
        &self,
        owner: &UserId,
        name: &str,
        members: BTreeSet<UserId>,
    ) -> SharingResult<ShareGroup> {
        if name.trim().is_empty() {
            return Err(SharingError::Validation("group name is blank".to_string()));
        }
        let group = ShareGroup {
            id: GroupId::new(),
            owner_user_id: owner.clone(),
            name: name.trim().to_string(),
            member_user_ids: members,
        };
        self.store.insert_group(&group)?;
        Ok(group)
    }

    pub fn rename_group(&self, id: GroupId, owner: &UserId, name: &str) -> SharingResult<()> {
        if name.trim().is_empty() {
            return Err(SharingError::Validation("group name is blank".to_string()));
        }
        self.owned_group(id, owner)?;
        self.store.rename_group(id, name.trim())
    }

    pub fn add_group_member(&self, id: GroupId, owner: &UserId, user: &UserId) -> SharingResult<()> {
        if user.is_blank() {
            return Err(SharingError::Validation("member id is blank".to_string()));
        }
        self.owned_group(id, owner)?;
        self.store.add_group_member(id, user)
    }

    pub fn remove_group_member(
        &self,
        id: GroupId,
        owner: &UserId,
        user: &UserId,
    ) -> SharingResult<()> {
        self.owned_group(id, owner)?;
        self.store.remove_group_member(id, user)
    }

    pub fn delete_group(&self, id: GroupId, owner: &UserId) -> SharingResult<()> {
        self.owned_group(id, owner)?;
        self.store.delete_group(id)
    }

    // ── automation rules ────────────────────────────────────────

    /// Creates a standing rule that shares future documents automatically.
    pub fn create_automation_rule(
        &self,
        owner: &UserId,
        target: ShareTarget,
        scope: RuleScope,
        permissions: PermissionSet,
    ) -> SharingResult<ShareAutomationRule> {
        if scope == RuleScope::Filtered {
            return Err(SharingError::Validation(
                "filtered rule scopes are not supported".to_string(),
            ));
        }
        self.validate_target(owner, &target)?;

        if self.store.rule_for_target(owner, &target)?.is_some() {
            return Err(SharingError::Validation(
                "a rule for this target already exists".to_string(),
            ));
        }

        let rule = ShareAutomationRule {
            id: RuleId::new(),
            owner_user_id: owner.clone(),
            target,
            scope,
            permissions: permissions.normalized(),
        };
        self.store.insert_rule(&rule)?;
        info!(rule_id = %rule.id, "automation rule created");
        Ok(rule)
    }

    /// Applies a rule retroactively to the owner's existing documents.
    ///
    /// Documents the target can already reach are skipped. The stop signal
    /// is checked between documents so a shutdown does not wait out a large
    /// backlog; work done so far stays applied. Returns the number of shares
    /// created.
    pub async fn apply_rule_to_existing_documents(
        &self,
        rule: &ShareAutomationRule,
        stop: &StopSignal,
    ) -> SharingResult<usize> {
        let existing = self
            .store
            .shares_for_target(&rule.owner_user_id, &rule.target)?;
        let already_shared: BTreeSet<DocumentId> =
            existing.iter().map(|s| s.document_id).collect();

        let mut created = 0usize;
        for document in self.store.documents_for_owner(&rule.owner_user_id)? {
            if stop.is_stopped() {
                info!(rule_id = %rule.id, created, "rule application stopped early");
                break;
            }
            if already_shared.contains(&document.id) {
                continue;
            }
            let share = DocumentShare {
                id: ShareId::new(),
                document_id: document.id,
                owner_user_id: rule.owner_user_id.clone(),
                target: rule.target.clone(),
                shared_at: Utc::now(),
                granted_by: rule.owner_user_id.clone(),
                permissions: rule.permissions.clone(),
            };
            self.store.insert_share(&share)?;
            self.projection.add_share(&share).await?;
            created += 1;
        }
        info!(rule_id = %rule.id, created, "rule applied to existing documents");
        Ok(created)
    }

    // ── helpers ─────────────────────────────────────────────────

    fn validate_target(&self, owner: &UserId, target: &ShareTarget) -> SharingResult<()> {
        match target {
            ShareTarget::User(user) => {
                if user.is_blank() {
                    return Err(SharingError::Validation(
                        "share target user id is blank".to_string(),
                    ));
                }
                if user == owner {
                    return Err(SharingError::Validation(
                        "cannot share a document with its owner".to_string(),
                    ));
                }
            }
            ShareTarget::Group(group_id) => {
                let group = self
                    .store
                    .group(*group_id)?
                    .ok_or_else(|| {
                        SharingError::Validation(format!("group {group_id} does not exist"))
                    })?;
                if &group.owner_user_id != owner {
                    return Err(SharingError::Authorization(
                        "cannot share with a group owned by someone else".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn owned_group(&self, id: GroupId, owner: &UserId) -> SharingResult<ShareGroup> {
        let group = self
            .store
            .group(id)?
            .ok_or_else(|| SharingError::NotFound(format!("group {id}")))?;
        if &group.owner_user_id != owner {
            return Err(SharingError::Authorization(
                "only the group owner can modify it".to_string(),
            ));
        }
        Ok(group)
    }
}
