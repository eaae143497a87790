//! External (anonymous) share lifecycle.
//!
//! An external share exposes exactly one artifact of one document for a
//! bounded time. Revoked and expired shares answer `None` immediately; the
//! sweeper deletes their rows afterwards, so unreachability never waits on
//! the sweep.

use crate::error::{SharingError, SharingResult};
use crate::store::SharingStore;
use crate::types::ExternalShare;
use crate::StopSignal;
use archivault_types::{Artifact, DocumentId, ShareId, UserId};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Creates, resolves, and revokes external shares.
#[derive(Clone)]
pub struct ExternalShareManager {
    store: SharingStore,
}

impl ExternalShareManager {
    pub fn new(store: SharingStore) -> Self {
        Self { store }
    }

    /// Issues a new external share valid for `ttl` from now.
    pub fn create(
        &self,
        document_id: DocumentId,
        artifact: Artifact,
        owner: &UserId,
        ttl: Duration,
    ) -> SharingResult<ExternalShare> {
        if ttl <= Duration::zero() {
            return Err(SharingError::Validation(
                "external share lifetime must be positive".to_string(),
            ));
        }
        let now = Utc::now();
        let share = ExternalShare {
            id: ShareId::new(),
            document_id,
            artifact,
            owner_user_id: owner.clone(),
            created_at_utc: now,
            expires_at_utc: now + ttl,
            revoked: false,
        };
        self.store.insert_external_share(&share)?;
        info!(share_id = %share.id, document_id = %document_id, "external share created");
        Ok(share)
    }

    /// Resolves a live external share. Unknown, revoked, and expired ids all
    /// come back as `None`; the caller cannot tell them apart.
    pub fn get(&self, id: ShareId, now: DateTime<Utc>) -> SharingResult<Option<ExternalShare>> {
        Ok(self
            .store
            .external_share(id)?
            .filter(|share| share.is_active(now)))
    }

    /// Revokes a share. Only its creator may do this.
    pub fn revoke(&self, id: ShareId, owner: &UserId) -> SharingResult<()> {
        let share = self
            .store
            .external_share(id)?
            .ok_or_else(|| SharingError::NotFound(format!("external share {id}")))?;
        if &share.owner_user_id != owner {
            return Err(SharingError::Authorization(
                "only the share creator can revoke it".to_string(),
            ));
        }
        self.store.set_external_share_revoked(id)?;
        info!(share_id = %id, "external share revoked");
        Ok(())
    }

    /// Deletes revoked and expired rows; returns how many were removed.
    pub fn delete_expired(&self, now: DateTime<Utc>) -> SharingResult<usize> {
        self.store.delete_expired_external_shares(now)
    }
}

/// Periodic cleanup of dead external shares.
///
/// Only one sweep runs at a time; an overlapping trigger is skipped rather
/// than queued.
pub struct ExternalShareSweeper {
    manager: ExternalShareManager,
    interval: std::time::Duration,
    sweep_lock: Arc<tokio::sync::Mutex<()>>,
}

impl ExternalShareSweeper {
    pub fn new(manager: ExternalShareManager, interval: std::time::Duration) -> Self {
        Self {
            manager,
            interval,
            sweep_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// One sweep pass. Returns 0 without sweeping if a pass is in flight.
    pub async fn run_once(&self) -> SharingResult<usize> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            debug!("external share sweep already running, skipping");
            return Ok(0);
        };
        let removed = self.manager.delete_expired(Utc::now())?;
        if removed > 0 {
            info!(removed, "expired external shares deleted");
        }
        Ok(removed)
    }

    /// Sweeps on a fixed interval until the stop signal fires. The wait
    /// between sweeps is sliced so shutdown never lags by a full interval.
    pub async fn run(&self, stop: StopSignal) {
        const STOP_POLL: std::time::Duration = std::time::Duration::from_millis(200);

        while !stop.is_stopped() {
            if let Err(e) = self.run_once().await {
                warn!(error = %e, "external share sweep failed");
            }
            let mut remaining = self.interval;
            while !stop.is_stopped() && !remaining.is_zero() {
                let slice = remaining.min(STOP_POLL);
                tokio::time::sleep(slice).await;
                remaining -= slice;
            }
        }
    }
}
