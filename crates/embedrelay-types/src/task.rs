//! Work items produced by the scanner and consumed by the delivery worker.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::ArtifactKey;

/// One unit of delivery work: a pointer to an upstream status artifact.
///
/// Created by the scanner, consumed exactly once logically (at-least-once
/// physically) by the delivery worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTask {
    /// Key of the status artifact in the upstream container.
    pub artifact_key: ArtifactKey,
    /// Upstream container the artifact lives in.
    pub container: String,
    /// ISO-8601 timestamp copied from the key for cheap ordering/filtering.
    pub timestamp: String,
    /// Unique task identity, distinct across re-enqueues of the same key.
    pub task_id: Uuid,
}

impl ProcessingTask {
    /// Build a task for an artifact in the given container.
    #[must_use]
    pub fn new(artifact_key: ArtifactKey, container: impl Into<String>) -> Self {
        let timestamp = artifact_key.timestamp_str().to_string();
        Self {
            artifact_key,
            container: container.into(),
            timestamp,
            task_id: Uuid::new_v4(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ArtifactKey {
        ArtifactKey::parse(&format!("2024-01-01T00:00:00.000Z-{}.json", "ab".repeat(32))).unwrap()
    }

    #[test]
    fn new_copies_timestamp_from_key() {
        let task = ProcessingTask::new(key(), "artifacts");
        assert_eq!(task.timestamp, "2024-01-01T00:00:00.000Z");
        assert_eq!(task.container, "artifacts");
    }

    #[test]
    fn task_ids_are_unique_per_enqueue() {
        let a = ProcessingTask::new(key(), "artifacts");
        let b = ProcessingTask::new(key(), "artifacts");
        assert_ne!(a.task_id, b.task_id);
    }

    #[test]
    fn serde_roundtrip() {
        let task = ProcessingTask::new(key(), "artifacts");
        let json = serde_json::to_string(&task).unwrap();
        let back: ProcessingTask = serde_json::from_str(&json).unwrap();
        assert_eq!(task, back);
    }
}
