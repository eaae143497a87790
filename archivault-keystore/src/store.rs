//! Append-only key record store.
//!
//! One row per append. Records are never updated or deleted; re-encrypting
//! an artifact appends a fresh record and readers resolve last-writer-wins
//! by the per-document sequence number. Appends for different artifacts of
//! the same document never conflict.

use crate::error::{KeystoreError, KeystoreResult};
use crate::record::{ArtifactKeyRecord, KeyRecordEvent};
use archivault_types::{Artifact, DocumentId};
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Minimum wrapped DEK length: 32-byte wrapped key plus 16-byte auth tag.
const MIN_WRAPPED_DEK_LEN: usize = 48;

/// Persists artifact key records, append-only per document.
#[derive(Clone)]
pub struct KeyRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl KeyRecordStore {
    /// Opens or creates a key record store at the given path.
    pub fn open(path: &Path) -> KeystoreResult<Self> {
        let conn = Connection::open(path)?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> KeystoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Appends a key record to a document's history and returns the
    /// persisted event. Rejects records whose wrapped DEK is shorter than
    /// the 48-byte floor.
    pub fn append(
        &self,
        document_id: DocumentId,
        record: ArtifactKeyRecord,
    ) -> KeystoreResult<KeyRecordEvent> {
        if record.wrapped_dek.len() < MIN_WRAPPED_DEK_LEN {
            return Err(KeystoreError::InvalidRecord(format!(
                "wrapped DEK is {} bytes, minimum is {MIN_WRAPPED_DEK_LEN}",
                record.wrapped_dek.len()
            )));
        }

        let conn = self.conn.lock().unwrap();
        let sequence: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM key_records WHERE document_id = ?",
            params![document_id.to_string()],
            |row| row.get(0),
        )?;

        let event = KeyRecordEvent {
            event_id: uuid::Uuid::new_v4(),
            document_id,
            sequence,
            recorded_at: Utc::now(),
            record,
        };
        let payload_json = serde_json::to_string(&event.record)?;

        conn.execute(
            r#"
            INSERT INTO key_records (
                event_id, document_id, sequence, artifact, recorded_at, payload_json
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                event.event_id.to_string(),
                event.document_id.to_string(),
                event.sequence,
                event.record.artifact.as_str(),
                event.recorded_at.timestamp_micros(),
                payload_json,
            ],
        )?;
        Ok(event)
    }

    /// Returns the newest key record for one artifact of a document.
    pub fn latest_for_artifact(
        &self,
        document_id: DocumentId,
        artifact: Artifact,
    ) -> KeystoreResult<Option<ArtifactKeyRecord>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT payload_json FROM key_records \
             WHERE document_id = ? AND artifact = ? \
             ORDER BY sequence DESC LIMIT 1",
            params![document_id.to_string(), artifact.as_str()],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(payload_json) => Ok(Some(serde_json::from_str(&payload_json)?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns a document's full append history, ordered by sequence.
    pub fn history(&self, document_id: DocumentId) -> KeystoreResult<Vec<KeyRecordEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT event_id, document_id, sequence, recorded_at, payload_json \
             FROM key_records WHERE document_id = ? ORDER BY sequence",
        )?;
        let rows = stmt.query_map(params![document_id.to_string()], row_to_parts)?;
        collect_events(rows)
    }

    /// Returns every key record event ever appended, across all documents,
    /// for the maintenance backup export.
    pub fn all_events(&self) -> KeystoreResult<Vec<KeyRecordEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT event_id, document_id, sequence, recorded_at, payload_json \
             FROM key_records ORDER BY document_id, sequence",
        )?;
        let rows = stmt.query_map([], row_to_parts)?;
        collect_events(rows)
    }
}

type RowParts = (String, String, i64, i64, String);

fn row_to_parts(row: &duckdb::Row<'_>) -> duckdb::Result<RowParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn collect_events(
    rows: impl Iterator<Item = duckdb::Result<RowParts>>,
) -> KeystoreResult<Vec<KeyRecordEvent>> {
    let mut events = Vec::new();
    for row in rows {
        let (event_id, document_id, sequence, recorded_at, payload_json) = row?;
        events.push(KeyRecordEvent {
            event_id: uuid::Uuid::parse_str(&event_id)
                .map_err(|e| KeystoreError::Corrupt(format!("event id: {e}")))?,
            document_id: DocumentId::from_str(&document_id)
                .map_err(|e| KeystoreError::Corrupt(format!("document id: {e}")))?,
            sequence,
            recorded_at: DateTime::from_timestamp_micros(recorded_at)
                .ok_or_else(|| KeystoreError::Corrupt(format!("timestamp: {recorded_at}")))?,
            record: serde_json::from_str(&payload_json)?,
        });
    }
    Ok(events)
}

fn initialize_schema(conn: &Connection) -> KeystoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS key_records (
            event_id VARCHAR PRIMARY KEY,
            document_id VARCHAR NOT NULL,
            sequence BIGINT NOT NULL,
            artifact VARCHAR NOT NULL,
            recorded_at BIGINT NOT NULL,
            payload_json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_key_records_document
            ON key_records(document_id, sequence);
        "#,
    )?;
    Ok(())
}
