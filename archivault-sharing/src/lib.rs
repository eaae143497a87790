//! Sharing model and access projection for Archivault.
//!
//! This crate covers:
//! - Direct shares from a document owner to users and owner-scoped groups
//! - Share automation rules that grant access without per-document action
//! - The derived per-document access view, mirrored to a search index sink
//! - External (anonymous) shares with expiry, revocation, and sweeping
//!
//! Persistence lives in [`SharingStore`]; [`ShareService`] is the validated
//! entry point for mutations and [`AccessProjection`] keeps the reader sets
//! and the search index in step with them.

pub mod error;
pub mod external;
pub mod index;
pub mod projection;
pub mod service;
pub mod store;
pub mod types;

pub use error::{SharingError, SharingResult};
pub use external::{ExternalShareManager, ExternalShareSweeper};
pub use index::{NullIndexSink, SearchIndexSink};
pub use projection::AccessProjection;
pub use service::ShareService;
pub use store::SharingStore;
pub use types::{
    DocumentAccessView, DocumentRecord, DocumentShare, ExternalShare, RuleScope,
    ShareAutomationRule, ShareGroup,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative shutdown flag shared between long-running loops.
#[derive(Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
