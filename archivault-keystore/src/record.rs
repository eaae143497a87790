//! Artifact key record types.

use archivault_types::{Artifact, DocumentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// On-disk envelope format a key record's artifact was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyFormatVersion {
    #[serde(rename = "1")]
    V1,
    #[serde(rename = "2")]
    V2,
}

impl KeyFormatVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFormatVersion::V1 => "1",
            KeyFormatVersion::V2 => "2",
        }
    }
}

impl fmt::Display for KeyFormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyFormatVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(KeyFormatVersion::V1),
            "2" => Ok(KeyFormatVersion::V2),
            other => Err(format!("unknown key format version: {other}")),
        }
    }
}

/// One artifact's wrapped DEK and wrap parameters.
///
/// Immutable once appended; a re-encrypted artifact appends a new record
/// rather than mutating this one, and readers take the newest per artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactKeyRecord {
    pub artifact: Artifact,
    /// Wrapped DEK: 32-byte key ciphertext plus 16-byte auth tag.
    pub wrapped_dek: Vec<u8>,
    /// Nonce used for the GCM wrap.
    pub wrap_nonce: [u8; 12],
    /// Wrap algorithm identifier, e.g. `"AES-256-GCM"`.
    pub algorithm: String,
    pub format_version: KeyFormatVersion,
}

/// A key record append, as persisted: the record plus its position in the
/// document's append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecordEvent {
    pub event_id: uuid::Uuid,
    /// The document whose history this append belongs to (the stream id in
    /// backup exports).
    pub document_id: DocumentId,
    /// Per-document monotonic sequence number, starting at 1.
    pub sequence: i64,
    pub recorded_at: DateTime<Utc>,
    pub record: ArtifactKeyRecord,
}
