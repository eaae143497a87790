//! Sharing domain types: shares, groups, automation rules, the derived
//! access view, and external (anonymous) shares.

use archivault_types::{
    Artifact, DocumentId, GroupId, PermissionSet, RuleId, ShareId, ShareTarget, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Minimal registry entry for a document the sharing layer can act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub owner_user_id: UserId,
    pub deleted: bool,
}

/// A direct grant from a document owner to a user or group.
///
/// At most one active share exists per (document, target).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentShare {
    pub id: ShareId,
    pub document_id: DocumentId,
    pub owner_user_id: UserId,
    pub target: ShareTarget,
    pub shared_at: DateTime<Utc>,
    pub granted_by: UserId,
    pub permissions: PermissionSet,
}

/// A named set of users, mutable only by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareGroup {
    pub id: GroupId,
    pub owner_user_id: UserId,
    pub name: String,
    pub member_user_ids: BTreeSet<UserId>,
}

/// Which documents an automation rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleScope {
    AllDocuments,
    /// Accepted by the type but rejected at creation; filtered rules are not
    /// executable yet.
    Filtered,
}

/// A standing rule that auto-grants access without per-document action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareAutomationRule {
    pub id: RuleId,
    pub owner_user_id: UserId,
    pub target: ShareTarget,
    pub scope: RuleScope,
    pub permissions: PermissionSet,
}

/// Derived "who can currently read this document" projection.
///
/// `effective_user_ids` always contains the owner plus the union of direct
/// users and the current members of every referenced group. It is never
/// trusted incrementally on removal: the set is recomputed from scratch so
/// group-membership drift cannot leave stale readers behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAccessView {
    pub id: DocumentId,
    pub owner_user_id: UserId,
    pub direct_user_ids: BTreeSet<UserId>,
    pub group_ids: BTreeSet<GroupId>,
    pub effective_user_ids: BTreeSet<UserId>,
}

impl DocumentAccessView {
    /// Fresh view for a document's first share. The owner is always an
    /// effective reader.
    pub fn new(id: DocumentId, owner_user_id: UserId) -> Self {
        let effective_user_ids = BTreeSet::from([owner_user_id.clone()]);
        Self {
            id,
            owner_user_id,
            direct_user_ids: BTreeSet::new(),
            group_ids: BTreeSet::new(),
            effective_user_ids,
        }
    }
}

/// A time-boxed anonymous share of one artifact of one document.
///
/// Unreachable once revoked or past expiry; a periodic sweep deletes such
/// rows permanently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalShare {
    pub id: ShareId,
    pub document_id: DocumentId,
    pub artifact: Artifact,
    pub owner_user_id: UserId,
    pub created_at_utc: DateTime<Utc>,
    pub expires_at_utc: DateTime<Utc>,
    pub revoked: bool,
}

impl ExternalShare {
    /// Whether the share can still be served at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at_utc > now
    }
}
