//! `SQLite`-backed implementation of [`StateStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. All timestamps are
//! stored as ISO-8601 UTC strings so string comparison matches time order.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use embedrelay_types::checkpoint::CheckpointRecord;
use embedrelay_types::id::{DocumentId, PipelineId};
use embedrelay_types::record::{
    DocumentStatus, ErrorDetails, FailureRecord, FailureStatus, Provenance, VectorMetadataRecord,
};
use rusqlite::Connection;

use crate::error::{self, StateError};
use crate::store::StateStore;

/// Idempotent DDL for state tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS checkpoints (
    pipeline TEXT PRIMARY KEY,
    last_processed_timestamp TEXT NOT NULL,
    last_processed_key TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vector_metadata (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL,
    status TEXT NOT NULL,
    indexed_at TEXT NOT NULL,
    processing_time_ms INTEGER NOT NULL,
    summary_json TEXT NOT NULL,
    sink_response_json TEXT NOT NULL,
    source_key TEXT NOT NULL,
    source_container TEXT NOT NULL,
    request_id TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_vector_metadata_document
    ON vector_metadata (document_id, id);

CREATE TABLE IF NOT EXISTS failure_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL,
    task_json TEXT NOT NULL,
    error_message TEXT NOT NULL,
    attempt_count INTEGER NOT NULL,
    first_failure_at TEXT,
    last_failure_at TEXT,
    dlq_processed_at TEXT NOT NULL,
    status TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_failure_records_document
    ON failure_records (document_id, id);
";

/// `SQLite`-backed state storage.
///
/// Create with [`SqliteStateStore::open`] for file-backed persistence or
/// [`SqliteStateStore::in_memory`] for tests.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open or create a `SQLite` state database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created, or
    /// [`StateError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Sqlite`] if the in-memory database can't be
    /// initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    fn now_iso() -> String {
        Utc::now().to_rfc3339()
    }

    fn metadata_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMetadataRow> {
        Ok(RawMetadataRow {
            document_id: row.get(0)?,
            status: row.get(1)?,
            indexed_at: row.get(2)?,
            processing_time_ms: row.get(3)?,
            summary_json: row.get(4)?,
            sink_response_json: row.get(5)?,
            source_key: row.get(6)?,
            source_container: row.get(7)?,
            request_id: row.get(8)?,
        })
    }
}

struct RawMetadataRow {
    document_id: String,
    status: String,
    indexed_at: String,
    processing_time_ms: i64,
    summary_json: String,
    sink_response_json: String,
    source_key: String,
    source_container: String,
    request_id: String,
}

impl RawMetadataRow {
    fn into_record(self) -> error::Result<VectorMetadataRecord> {
        let status = match self.status.as_str() {
            "completed" => DocumentStatus::Completed,
            "failed" => DocumentStatus::Failed,
            "processing" => DocumentStatus::Processing,
            _ => DocumentStatus::Pending,
        };
        #[allow(clippy::cast_sign_loss)]
        Ok(VectorMetadataRecord {
            document_id: DocumentId::new(self.document_id),
            status,
            indexed_at: self.indexed_at,
            processing_time_ms: self.processing_time_ms as u64,
            summary: serde_json::from_str(&self.summary_json)?,
            sink_response: serde_json::from_str(&self.sink_response_json)?,
            provenance: Provenance {
                source_key: self.source_key,
                source_container: self.source_container,
                request_id: self.request_id,
            },
        })
    }
}

impl StateStore for SqliteStateStore {
    fn get_checkpoint(&self, pipeline: &PipelineId) -> error::Result<Option<CheckpointRecord>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT last_processed_timestamp, last_processed_key, updated_at \
             FROM checkpoints WHERE pipeline = ?1",
            [pipeline.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        );

        match result {
            Ok((last_processed_timestamp, last_processed_key, updated_at)) => {
                Ok(Some(CheckpointRecord {
                    pipeline_id: pipeline.clone(),
                    last_processed_timestamp,
                    last_processed_key,
                    updated_at,
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn advance_checkpoint(
        &self,
        pipeline: &PipelineId,
        timestamp: &str,
        key: &str,
        expected_updated_at: Option<&str>,
    ) -> error::Result<bool> {
        let conn = self.lock_conn()?;
        let now = Self::now_iso();

        let rows_affected = match expected_updated_at {
            Some(expected) => conn.execute(
                "UPDATE checkpoints \
                 SET last_processed_timestamp = ?1, last_processed_key = ?2, updated_at = ?3 \
                 WHERE pipeline = ?4 AND updated_at = ?5",
                rusqlite::params![timestamp, key, now, pipeline.as_str(), expected],
            )?,
            None => conn.execute(
                "INSERT OR IGNORE INTO checkpoints \
                 (pipeline, last_processed_timestamp, last_processed_key, updated_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![pipeline.as_str(), timestamp, key, now],
            )?,
        };

        Ok(rows_affected > 0)
    }

    fn insert_metadata_record(&self, record: &VectorMetadataRecord) -> error::Result<()> {
        let summary_json = serde_json::to_string(&record.summary)?;
        let sink_response_json = serde_json::to_string(&record.sink_response)?;
        let conn = self.lock_conn()?;
        #[allow(clippy::cast_possible_wrap)]
        conn.execute(
            "INSERT INTO vector_metadata \
             (document_id, status, indexed_at, processing_time_ms, summary_json, \
              sink_response_json, source_key, source_container, request_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                record.document_id.as_str(),
                record.status.as_str(),
                record.indexed_at,
                record.processing_time_ms as i64,
                summary_json,
                sink_response_json,
                record.provenance.source_key,
                record.provenance.source_container,
                record.provenance.request_id,
            ],
        )?;
        Ok(())
    }

    fn latest_metadata(
        &self,
        document_id: &DocumentId,
    ) -> error::Result<Option<VectorMetadataRecord>> {
        let raw = {
            let conn = self.lock_conn()?;
            let result = conn.query_row(
                "SELECT document_id, status, indexed_at, processing_time_ms, summary_json, \
                        sink_response_json, source_key, source_container, request_id \
                 FROM vector_metadata WHERE document_id = ?1 ORDER BY id DESC LIMIT 1",
                [document_id.as_str()],
                Self::metadata_from_row,
            );
            match result {
                Ok(raw) => raw,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        };
        raw.into_record().map(Some)
    }

    fn mark_document_failed(&self, document_id: &DocumentId) -> error::Result<u64> {
        let conn = self.lock_conn()?;
        let rows = conn.execute(
            "UPDATE vector_metadata SET status = ?1 WHERE document_id = ?2",
            rusqlite::params![DocumentStatus::Failed.as_str(), document_id.as_str()],
        )?;
        Ok(rows as u64)
    }

    fn insert_failure_record(&self, record: &FailureRecord) -> error::Result<()> {
        let task_json = serde_json::to_string(&record.original_task)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO failure_records \
             (document_id, task_json, error_message, attempt_count, first_failure_at, \
              last_failure_at, dlq_processed_at, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                record.document_id.as_str(),
                task_json,
                record.error_details.message,
                record.error_details.attempt_count,
                record.error_details.first_failure_at,
                record.error_details.last_failure_at,
                record.dlq_processed_at,
                record.status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn latest_failure(&self, document_id: &DocumentId) -> error::Result<Option<FailureRecord>> {
        let raw = {
            let conn = self.lock_conn()?;
            let result = conn.query_row(
                "SELECT document_id, task_json, error_message, attempt_count, first_failure_at, \
                        last_failure_at, dlq_processed_at, status \
                 FROM failure_records WHERE document_id = ?1 ORDER BY id DESC LIMIT 1",
                [document_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            );
            match result {
                Ok(raw) => raw,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        };

        let (doc, task_json, message, attempt_count, first, last, dlq_processed_at, status) = raw;
        let status = if status == FailureStatus::RequiresManualReview.as_str() {
            FailureStatus::RequiresManualReview
        } else {
            FailureStatus::Logged
        };
        Ok(Some(FailureRecord {
            document_id: DocumentId::new(doc),
            original_task: serde_json::from_str(&task_json)?,
            error_details: ErrorDetails {
                message,
                attempt_count,
                first_failure_at: first,
                last_failure_at: last,
            },
            dlq_processed_at,
            status,
        }))
    }
}
