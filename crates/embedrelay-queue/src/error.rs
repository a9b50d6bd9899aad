//! Task queue error types.

/// Errors produced by [`TaskQueue`](crate::TaskQueue) operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored task body failed to (de)serialize.
    #[error("task body corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("task queue lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, QueueError>;
