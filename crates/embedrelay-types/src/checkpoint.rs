//! Durable scanner cursor.

use serde::{Deserialize, Serialize};

use crate::id::PipelineId;

/// Single-row-per-pipeline cursor marking the last artifact known to be
/// fully, contiguously enqueued.
///
/// Mutated only by the scanner and never deleted. `last_processed_timestamp`
/// is monotonically non-decreasing and only advances past artifacts that
/// were successfully enqueued, never past a gap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub pipeline_id: PipelineId,
    /// ISO-8601 timestamp of the last contiguously enqueued artifact.
    pub last_processed_timestamp: String,
    /// Full key of the last contiguously enqueued artifact.
    pub last_processed_key: String,
    /// ISO-8601 write time; used as the compare-and-swap token for
    /// detecting overlapping scanner invocations.
    pub updated_at: String,
}
