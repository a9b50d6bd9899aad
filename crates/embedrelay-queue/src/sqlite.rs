//! `SQLite`-backed implementation of [`TaskQueue`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. Timestamps are
//! fixed-width ISO-8601 UTC strings (microsecond precision) so string
//! comparison in SQL matches time order.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use embedrelay_types::task::ProcessingTask;
use rusqlite::Connection;

use crate::error::{self, QueueError};
use crate::queue::{Delivery, TaskQueue};

const STATE_READY: &str = "ready";
const STATE_INFLIGHT: &str = "inflight";
const STATE_DEAD: &str = "dead";

/// Idempotent DDL for the queue table.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS queue_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_json TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'ready',
    attempts INTEGER NOT NULL DEFAULT 0,
    visible_at TEXT NOT NULL,
    first_received_at TEXT,
    last_received_at TEXT,
    enqueued_at TEXT NOT NULL,
    dead_lettered_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_queue_state_visible
    ON queue_messages (state, visible_at, id);
";

/// `SQLite`-backed task queue satisfying the at-least-once contract.
pub struct SqliteTaskQueue {
    conn: Mutex<Connection>,
    visibility_timeout: Duration,
    max_attempts: u32,
}

impl SqliteTaskQueue {
    /// Open or create a queue database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Io`] if the directory can't be created, or
    /// [`QueueError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path, visibility_timeout: Duration, max_attempts: u32) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
            visibility_timeout,
            max_attempts: max_attempts.max(1),
        })
    }

    /// Create an in-memory queue (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Sqlite`] if the in-memory database can't be
    /// initialized.
    pub fn in_memory(visibility_timeout: Duration, max_attempts: u32) -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
            visibility_timeout,
            max_attempts: max_attempts.max(1),
        })
    }

    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| QueueError::LockPoisoned)
    }

    /// Fixed-width ISO-8601 UTC timestamp (string order == time order).
    fn now_iso() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn visible_after(&self, now: &str) -> String {
        Self::iso_after(now, self.visibility_timeout)
    }

    /// `now` shifted forward by `delta`, same fixed-width format.
    fn iso_after(now: &str, delta: Duration) -> String {
        let delta = chrono::Duration::from_std(delta)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        chrono::DateTime::parse_from_rfc3339(now)
            .map(|dt| (dt + delta).to_rfc3339_opts(SecondsFormat::Micros, true))
            .unwrap_or_else(|_| now.to_string())
    }
}

struct CandidateRow {
    id: i64,
    task_json: String,
    attempts: u32,
    first_received_at: Option<String>,
}

impl TaskQueue for SqliteTaskQueue {
    fn enqueue(&self, task: &ProcessingTask) -> error::Result<()> {
        let task_json = serde_json::to_string(task)?;
        let now = Self::now_iso();
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO queue_messages (task_json, state, attempts, visible_at, enqueued_at) \
             VALUES (?1, ?2, 0, ?3, ?3)",
            rusqlite::params![task_json, STATE_READY, now],
        )?;
        Ok(())
    }

    fn receive(&self, max_items: usize) -> error::Result<Vec<Delivery>> {
        if max_items == 0 {
            return Ok(Vec::new());
        }
        let now = Self::now_iso();
        let invisible_until = self.visible_after(&now);
        let conn = self.lock_conn()?;
        let tx = conn.unchecked_transaction()?;

        // Visible messages in enqueue order. Covers both ready messages and
        // inflight messages whose visibility timeout has lapsed.
        let candidates: Vec<CandidateRow> = {
            let mut stmt = tx.prepare(
                "SELECT id, task_json, attempts, first_received_at \
                 FROM queue_messages \
                 WHERE state != ?1 AND visible_at <= ?2 \
                 ORDER BY id",
            )?;
            let rows = stmt.query_map(rusqlite::params![STATE_DEAD, now], |row| {
                Ok(CandidateRow {
                    id: row.get(0)?,
                    task_json: row.get(1)?,
                    attempts: row.get(2)?,
                    first_received_at: row.get(3)?,
                })
            })?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut deliveries = Vec::new();
        for candidate in candidates {
            if deliveries.len() == max_items {
                break;
            }
            if candidate.attempts >= self.max_attempts {
                // Attempts exhausted: move to the dead-letter channel
                // instead of redelivering.
                tx.execute(
                    "UPDATE queue_messages SET state = ?1, dead_lettered_at = ?2 WHERE id = ?3",
                    rusqlite::params![STATE_DEAD, now, candidate.id],
                )?;
                continue;
            }

            let attempt = candidate.attempts + 1;
            tx.execute(
                "UPDATE queue_messages \
                 SET state = ?1, attempts = ?2, visible_at = ?3, \
                     first_received_at = COALESCE(first_received_at, ?4), \
                     last_received_at = ?4 \
                 WHERE id = ?5",
                rusqlite::params![STATE_INFLIGHT, attempt, invisible_until, now, candidate.id],
            )?;
            deliveries.push(Delivery {
                delivery_id: candidate.id,
                task: serde_json::from_str(&candidate.task_json)?,
                attempt,
                first_received_at: candidate
                    .first_received_at
                    .or_else(|| Some(now.clone())),
                last_received_at: Some(now.clone()),
            });
        }

        tx.commit()?;
        Ok(deliveries)
    }

    fn ack(&self, delivery: &Delivery) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "DELETE FROM queue_messages WHERE id = ?1",
            [delivery.delivery_id],
        )?;
        Ok(())
    }

    fn fail(&self, delivery: &Delivery, retry_delay: Duration) -> error::Result<()> {
        let now = Self::now_iso();
        let conn = self.lock_conn()?;
        // Attempts are read from the row, not the delivery, so a stale
        // handle can't reset the count.
        let attempts: u32 = match conn.query_row(
            "SELECT attempts FROM queue_messages WHERE id = ?1",
            [delivery.delivery_id],
            |row| row.get(0),
        ) {
            Ok(a) => a,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if attempts >= self.max_attempts {
            conn.execute(
                "UPDATE queue_messages SET state = ?1, dead_lettered_at = ?2 WHERE id = ?3",
                rusqlite::params![STATE_DEAD, now, delivery.delivery_id],
            )?;
        } else {
            // Redeliverable only once the retry delay has lapsed.
            let visible_at = Self::iso_after(&now, retry_delay);
            conn.execute(
                "UPDATE queue_messages SET state = ?1, visible_at = ?2 WHERE id = ?3",
                rusqlite::params![STATE_READY, visible_at, delivery.delivery_id],
            )?;
        }
        Ok(())
    }

    fn receive_dead_letters(&self, max_items: usize) -> error::Result<Vec<Delivery>> {
        if max_items == 0 {
            return Ok(Vec::new());
        }
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, task_json, attempts, first_received_at, last_received_at \
             FROM queue_messages WHERE state = ?1 ORDER BY id LIMIT ?2",
        )?;
        #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
        let rows = stmt.query_map(rusqlite::params![STATE_DEAD, max_items as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut deliveries = Vec::new();
        for row in rows {
            let (id, task_json, attempts, first, last) = row?;
            deliveries.push(Delivery {
                delivery_id: id,
                task: serde_json::from_str(&task_json)?,
                attempt: attempts,
                first_received_at: first,
                last_received_at: last,
            });
        }
        Ok(deliveries)
    }
}
