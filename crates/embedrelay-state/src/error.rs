//! Errors for the checkpoint and metadata store.

/// Errors produced by [`StateStore`](crate::StateStore) operations.
///
/// Checkpoints, metadata records, and failure records all live in one
/// `SQLite` database, so a single error enum covers the store.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying `SQLite` failure.
    #[error("state database: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("state storage i/o: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted record or summary column failed to (de)serialize.
    #[error("persisted record corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("state store lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_error_displays_context() {
        let inner = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("table not found".into()),
        );
        let err = StateError::Sqlite(inner);
        assert!(err.to_string().contains("state database"));
    }

    #[test]
    fn lock_poisoned_displays() {
        assert_eq!(
            StateError::LockPoisoned.to_string(),
            "state store lock poisoned"
        );
    }

    #[test]
    fn io_error_wraps() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(StateError::Io(inner).to_string().contains("i/o"));
    }
}
