//! DuckDB-backed persistence for the sharing model.
//!
//! One connection holds every sharing table: the document registry, direct
//! shares, share groups and their members, automation rules, the projected
//! access views, and external shares. All methods are synchronous and take
//! the connection mutex briefly; orchestration above this layer is async.

use crate::error::{SharingError, SharingResult};
use crate::types::{
    DocumentAccessView, DocumentRecord, DocumentShare, ExternalShare, RuleScope,
    ShareAutomationRule, ShareGroup,
};
use archivault_types::{
    Artifact, DocumentId, GroupId, RuleId, ShareId, ShareTarget, UserId,
};
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Persists shares, groups, rules, access views, and external shares.
#[derive(Clone)]
pub struct SharingStore {
    conn: Arc<Mutex<Connection>>,
}

fn target_parts(target: &ShareTarget) -> (&'static str, String) {
    match target {
        ShareTarget::User(user) => ("user", user.to_string()),
        ShareTarget::Group(group) => ("group", group.to_string()),
    }
}

fn parse_target(kind: &str, id: &str) -> SharingResult<ShareTarget> {
    match kind {
        "user" => Ok(ShareTarget::User(UserId::from(id))),
        "group" => Ok(ShareTarget::Group(
            GroupId::from_str(id)
                .map_err(|e| SharingError::Corrupt(format!("group target id: {e}")))?,
        )),
        other => Err(SharingError::Corrupt(format!("share target kind: {other}"))),
    }
}

fn from_micros(micros: i64) -> SharingResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| SharingError::Corrupt(format!("timestamp: {micros}")))
}

/// The UNIQUE constraints on `shares` and `automation_rules` backstop the
/// service-level duplicate checks: two concurrent creates for the same
/// target can both pass the pre-check, but only one insert wins.
fn constraint_to_validation(e: duckdb::Error, message: &str) -> SharingError {
    if e.to_string().to_lowercase().contains("constraint") {
        SharingError::Validation(message.to_string())
    } else {
        SharingError::Storage(e)
    }
}

type ShareRow = (String, String, String, String, String, i64, String, String);

fn share_row(row: &duckdb::Row<'_>) -> duckdb::Result<ShareRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn share_from_row(row: ShareRow) -> SharingResult<DocumentShare> {
    let (id, document_id, owner, target_type, target_id, shared_at, granted_by, permissions) = row;
    Ok(DocumentShare {
        id: ShareId::from_str(&id)
            .map_err(|e| SharingError::Corrupt(format!("share id: {e}")))?,
        document_id: DocumentId::from_str(&document_id)
            .map_err(|e| SharingError::Corrupt(format!("document id: {e}")))?,
        owner_user_id: UserId::from(owner),
        target: parse_target(&target_type, &target_id)?,
        shared_at: from_micros(shared_at)?,
        granted_by: UserId::from(granted_by),
        permissions: serde_json::from_str(&permissions)?,
    })
}

const SELECT_SHARE: &str = "SELECT id, document_id, owner_user_id, target_type, target_id, \
                            shared_at, granted_by, permissions_json FROM shares";

impl SharingStore {
    /// Opens or creates a sharing store at the given path.
    pub fn open(path: &Path) -> SharingResult<Self> {
        let conn = Connection::open(path)?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> SharingResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ── document registry ───────────────────────────────────────

    pub fn register_document(&self, document: &DocumentRecord) -> SharingResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO documents (id, owner_user_id, deleted) VALUES (?, ?, ?)",
            params![
                document.id.to_string(),
                document.owner_user_id.to_string(),
                document.deleted,
            ],
        )?;
        Ok(())
    }

    pub fn document(&self, id: DocumentId) -> SharingResult<Option<DocumentRecord>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT id, owner_user_id, deleted FROM documents WHERE id = ?",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            },
        );
        match result {
            Ok((id, owner, deleted)) => Ok(Some(DocumentRecord {
                id: DocumentId::from_str(&id)
                    .map_err(|e| SharingError::Corrupt(format!("document id: {e}")))?,
                owner_user_id: UserId::from(owner),
                deleted,
            })),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Non-deleted documents belonging to an owner.
    pub fn documents_for_owner(&self, owner: &UserId) -> SharingResult<Vec<DocumentRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, owner_user_id FROM documents WHERE owner_user_id = ? AND NOT deleted \
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![owner.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, owner) = row?;
            documents.push(DocumentRecord {
                id: DocumentId::from_str(&id)
                    .map_err(|e| SharingError::Corrupt(format!("document id: {e}")))?,
                owner_user_id: UserId::from(owner),
                deleted: false,
            });
        }
        Ok(documents)
    }

    // ── direct shares ───────────────────────────────────────────

    pub fn insert_share(&self, share: &DocumentShare) -> SharingResult<()> {
        let (target_type, target_id) = target_parts(&share.target);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO shares (id, document_id, owner_user_id, target_type, target_id, \
             shared_at, granted_by, permissions_json) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                share.id.to_string(),
                share.document_id.to_string(),
                share.owner_user_id.to_string(),
                target_type,
                target_id,
                share.shared_at.timestamp_micros(),
                share.granted_by.to_string(),
                serde_json::to_string(&share.permissions)?,
            ],
        )
        .map_err(|e| {
            constraint_to_validation(e, "target already has a share for this document")
        })?;
        Ok(())
    }

    pub fn share(&self, id: ShareId) -> SharingResult<Option<DocumentShare>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            &format!("{SELECT_SHARE} WHERE id = ?"),
            params![id.to_string()],
            share_row,
        );
        match result {
            Ok(row) => Ok(Some(share_from_row(row)?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The active share for a (document, target) pair, if any.
    pub fn share_for_target(
        &self,
        document_id: DocumentId,
        target: &ShareTarget,
    ) -> SharingResult<Option<DocumentShare>> {
        let (target_type, target_id) = target_parts(target);
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            &format!("{SELECT_SHARE} WHERE document_id = ? AND target_type = ? AND target_id = ?"),
            params![document_id.to_string(), target_type, target_id],
            share_row,
        );
        match result {
            Ok(row) => Ok(Some(share_from_row(row)?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All shares an owner has granted to one target, across documents.
    pub fn shares_for_target(
        &self,
        owner: &UserId,
        target: &ShareTarget,
    ) -> SharingResult<Vec<DocumentShare>> {
        let (target_type, target_id) = target_parts(target);
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_SHARE} WHERE owner_user_id = ? AND target_type = ? AND target_id = ? \
             ORDER BY shared_at"
        ))?;
        let rows = stmt.query_map(params![owner.to_string(), target_type, target_id], share_row)?;

        let mut shares = Vec::new();
        for row in rows {
            shares.push(share_from_row(row?)?);
        }
        Ok(shares)
    }

    pub fn delete_share(&self, id: ShareId) -> SharingResult<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM shares WHERE id = ?", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    // ── share groups ────────────────────────────────────────────

    pub fn insert_group(&self, group: &ShareGroup) -> SharingResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO share_groups (id, owner_user_id, name) VALUES (?, ?, ?)",
            params![
                group.id.to_string(),
                group.owner_user_id.to_string(),
                group.name,
            ],
        )?;
        for member in &group.member_user_ids {
            conn.execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?, ?)",
                params![group.id.to_string(), member.to_string()],
            )?;
        }
        Ok(())
    }

    pub fn group(&self, id: GroupId) -> SharingResult<Option<ShareGroup>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT owner_user_id, name FROM share_groups WHERE id = ?",
            params![id.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        );
        let (owner, name) = match result {
            Ok(parts) => parts,
            Err(duckdb::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut stmt =
            conn.prepare("SELECT user_id FROM group_members WHERE group_id = ? ORDER BY user_id")?;
        let rows = stmt.query_map(params![id.to_string()], |row| row.get::<_, String>(0))?;
        let mut member_user_ids = BTreeSet::new();
        for row in rows {
            member_user_ids.insert(UserId::from(row?));
        }

        Ok(Some(ShareGroup {
            id,
            owner_user_id: UserId::from(owner),
            name,
            member_user_ids,
        }))
    }

    /// Current members of a group; empty when the group no longer exists.
    pub fn group_members(&self, id: GroupId) -> SharingResult<BTreeSet<UserId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT user_id FROM group_members WHERE group_id = ?")?;
        let rows = stmt.query_map(params![id.to_string()], |row| row.get::<_, String>(0))?;
        let mut members = BTreeSet::new();
        for row in rows {
            members.insert(UserId::from(row?));
        }
        Ok(members)
    }

    pub fn rename_group(&self, id: GroupId, name: &str) -> SharingResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE share_groups SET name = ? WHERE id = ?",
            params![name, id.to_string()],
        )?;
        Ok(())
    }

    pub fn add_group_member(&self, id: GroupId, user: &UserId) -> SharingResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?, ?)",
            params![id.to_string(), user.to_string()],
        )?;
        Ok(())
    }

    pub fn remove_group_member(&self, id: GroupId, user: &UserId) -> SharingResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM group_members WHERE group_id = ? AND user_id = ?",
            params![id.to_string(), user.to_string()],
        )?;
        Ok(())
    }

    pub fn delete_group(&self, id: GroupId) -> SharingResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM group_members WHERE group_id = ?", params![id.to_string()])?;
        conn.execute("DELETE FROM share_groups WHERE id = ?", params![id.to_string()])?;
        Ok(())
    }

    // ── automation rules ────────────────────────────────────────

    pub fn insert_rule(&self, rule: &ShareAutomationRule) -> SharingResult<()> {
        let (target_type, target_id) = target_parts(&rule.target);
        let scope = match rule.scope {
            RuleScope::AllDocuments => "all",
            RuleScope::Filtered => "filtered",
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO automation_rules (id, owner_user_id, target_type, target_id, scope, \
             permissions_json) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                rule.id.to_string(),
                rule.owner_user_id.to_string(),
                target_type,
                target_id,
                scope,
                serde_json::to_string(&rule.permissions)?,
            ],
        )
        .map_err(|e| constraint_to_validation(e, "a rule for this target already exists"))?;
        Ok(())
    }

    /// The rule an owner already has for a target, if any (duplicate check).
    pub fn rule_for_target(
        &self,
        owner: &UserId,
        target: &ShareTarget,
    ) -> SharingResult<Option<ShareAutomationRule>> {
        let (target_type, target_id) = target_parts(target);
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT id, scope, permissions_json FROM automation_rules \
             WHERE owner_user_id = ? AND target_type = ? AND target_id = ?",
            params![owner.to_string(), target_type, target_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        );
        match result {
            Ok((id, scope, permissions)) => Ok(Some(ShareAutomationRule {
                id: RuleId::from_str(&id)
                    .map_err(|e| SharingError::Corrupt(format!("rule id: {e}")))?,
                owner_user_id: owner.clone(),
                target: target.clone(),
                scope: match scope.as_str() {
                    "all" => RuleScope::AllDocuments,
                    "filtered" => RuleScope::Filtered,
                    other => {
                        return Err(SharingError::Corrupt(format!("rule scope: {other}")))
                    }
                },
                permissions: serde_json::from_str(&permissions)?,
            })),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ── access views ────────────────────────────────────────────

    pub fn upsert_view(&self, view: &DocumentAccessView) -> SharingResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO access_views (document_id, owner_user_id, direct_json, \
             groups_json, effective_json) VALUES (?, ?, ?, ?, ?)",
            params![
                view.id.to_string(),
                view.owner_user_id.to_string(),
                serde_json::to_string(&view.direct_user_ids)?,
                serde_json::to_string(&view.group_ids)?,
                serde_json::to_string(&view.effective_user_ids)?,
            ],
        )?;
        Ok(())
    }

    pub fn view(&self, document_id: DocumentId) -> SharingResult<Option<DocumentAccessView>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT owner_user_id, direct_json, groups_json, effective_json \
             FROM access_views WHERE document_id = ?",
            params![document_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        );
        match result {
            Ok((owner, direct, groups, effective)) => Ok(Some(DocumentAccessView {
                id: document_id,
                owner_user_id: UserId::from(owner),
                direct_user_ids: serde_json::from_str(&direct)?,
                group_ids: serde_json::from_str(&groups)?,
                effective_user_ids: serde_json::from_str(&effective)?,
            })),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ── external shares ─────────────────────────────────────────

    pub fn insert_external_share(&self, share: &ExternalShare) -> SharingResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO external_shares (id, document_id, artifact, owner_user_id, created_at, \
             expires_at, revoked) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                share.id.to_string(),
                share.document_id.to_string(),
                share.artifact.as_str(),
                share.owner_user_id.to_string(),
                share.created_at_utc.timestamp_micros(),
                share.expires_at_utc.timestamp_micros(),
                share.revoked,
            ],
        )?;
        Ok(())
    }

    pub fn external_share(&self, id: ShareId) -> SharingResult<Option<ExternalShare>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT document_id, artifact, owner_user_id, created_at, expires_at, revoked \
             FROM external_shares WHERE id = ?",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            },
        );
        match result {
            Ok((document_id, artifact, owner, created_at, expires_at, revoked)) => {
                Ok(Some(ExternalShare {
                    id,
                    document_id: DocumentId::from_str(&document_id)
                        .map_err(|e| SharingError::Corrupt(format!("document id: {e}")))?,
                    artifact: Artifact::from_str(&artifact)
                        .map_err(|e| SharingError::Corrupt(e.to_string()))?,
                    owner_user_id: UserId::from(owner),
                    created_at_utc: from_micros(created_at)?,
                    expires_at_utc: from_micros(expires_at)?,
                    revoked,
                }))
            }
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_external_share_revoked(&self, id: ShareId) -> SharingResult<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE external_shares SET revoked = TRUE WHERE id = ?",
            params![id.to_string()],
        )?;
        Ok(updated > 0)
    }

    /// Deletes revoked and expired external shares; returns the count.
    pub fn delete_expired_external_shares(&self, now: DateTime<Utc>) -> SharingResult<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM external_shares WHERE revoked OR expires_at < ?",
            params![now.timestamp_micros()],
        )?;
        Ok(deleted)
    }
}

fn initialize_schema(conn: &Connection) -> SharingResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id VARCHAR PRIMARY KEY,
            owner_user_id VARCHAR NOT NULL,
            deleted BOOLEAN NOT NULL DEFAULT FALSE
        );
        CREATE TABLE IF NOT EXISTS shares (
            id VARCHAR PRIMARY KEY,
            document_id VARCHAR NOT NULL,
            owner_user_id VARCHAR NOT NULL,
            target_type VARCHAR NOT NULL,
            target_id VARCHAR NOT NULL,
            shared_at BIGINT NOT NULL,
            granted_by VARCHAR NOT NULL,
            permissions_json TEXT NOT NULL,
            UNIQUE (document_id, target_type, target_id)
        );
        CREATE INDEX IF NOT EXISTS idx_shares_document ON shares(document_id);
        CREATE INDEX IF NOT EXISTS idx_shares_owner_target
            ON shares(owner_user_id, target_type, target_id);
        CREATE TABLE IF NOT EXISTS share_groups (
            id VARCHAR PRIMARY KEY,
            owner_user_id VARCHAR NOT NULL,
            name VARCHAR NOT NULL
        );
        CREATE TABLE IF NOT EXISTS group_members (
            group_id VARCHAR NOT NULL,
            user_id VARCHAR NOT NULL,
            PRIMARY KEY (group_id, user_id)
        );
        CREATE TABLE IF NOT EXISTS automation_rules (
            id VARCHAR PRIMARY KEY,
            owner_user_id VARCHAR NOT NULL,
            target_type VARCHAR NOT NULL,
            target_id VARCHAR NOT NULL,
            scope VARCHAR NOT NULL,
            permissions_json TEXT NOT NULL,
            UNIQUE (owner_user_id, target_type, target_id)
        );
        CREATE TABLE IF NOT EXISTS access_views (
            document_id VARCHAR PRIMARY KEY,
            owner_user_id VARCHAR NOT NULL,
            direct_json TEXT NOT NULL,
            groups_json TEXT NOT NULL,
            effective_json TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS external_shares (
            id VARCHAR PRIMARY KEY,
            document_id VARCHAR NOT NULL,
            artifact VARCHAR NOT NULL,
            owner_user_id VARCHAR NOT NULL,
            created_at BIGINT NOT NULL,
            expires_at BIGINT NOT NULL,
            revoked BOOLEAN NOT NULL DEFAULT FALSE
        );
        "#,
    )?;
    Ok(())
}
