//! Append-only artifact key record store for Archivault.
//!
//! Every encrypted artifact write appends an [`ArtifactKeyRecord`] (wrapped
//! DEK, wrap nonce, algorithm, envelope format version) to its document's
//! history. The artifact streamer reads the newest record per artifact; the
//! maintenance export enumerates the full history for key backup.

mod error;
mod record;
mod store;

pub use error::{KeystoreError, KeystoreResult};
pub use record::{ArtifactKeyRecord, KeyFormatVersion, KeyRecordEvent};
pub use store::KeyRecordStore;
