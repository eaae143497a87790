//! Artifact delivery for Archivault.
//!
//! The read path: a caller presents a signed token (or is already
//! authorized), the streamer resolves the document and artifact to stored
//! bytes, decrypts them when the document is encrypted, and hands back
//! plaintext with the right content type. Every failure on this path
//! collapses to one indistinguishable [`NotFound`] outcome.
//!
//! Also hosts the maintenance key-backup export: a background job zipping
//! the full key-record history for offline safekeeping.

pub mod collaborators;
mod error;
pub mod export;
pub mod streamer;

pub use collaborators::{ArtifactStorage, DocumentDirectory, DocumentView};
pub use error::NotFound;
pub use export::{ExportId, ExportManager, ExportStatus};
pub use streamer::{
    content_type, expires_header, ArtifactPayload, ArtifactStreamer, DeliveryConfig,
    CACHE_CONTROL_IMMUTABLE,
};
