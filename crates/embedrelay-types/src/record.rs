//! Audit and failure records written by the worker and dead-letter handler.

use serde::{Deserialize, Serialize};

use crate::document::EmbeddingSummary;
use crate::id::DocumentId;
use crate::task::ProcessingTask;

/// Derived pipeline state of a document, computed freshly per status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a delivered document came from, for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_key: String,
    pub source_container: String,
    /// Correlation id of the sink request that delivered the document.
    pub request_id: String,
}

/// Append-only audit record written after a successful sink write.
///
/// Duplicates are tolerated: this is an audit trail, not a dedup index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorMetadataRecord {
    pub document_id: DocumentId,
    pub status: DocumentStatus,
    /// ISO-8601 time the sink confirmed the upsert.
    pub indexed_at: String,
    pub processing_time_ms: u64,
    pub summary: EmbeddingSummary,
    /// JSON response body echoed back by the sink.
    pub sink_response: serde_json::Value,
    pub provenance: Provenance,
}

/// Disposition of a terminally-failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStatus {
    Logged,
    RequiresManualReview,
}

impl FailureStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Logged => "logged",
            Self::RequiresManualReview => "requires_manual_review",
        }
    }
}

impl std::fmt::Display for FailureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure metadata extracted from dead-letter delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failure_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<String>,
}

/// Durable record of a terminally-failed task, written once per task when
/// it reaches the dead-letter channel. The record of truth for manual review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub document_id: DocumentId,
    pub original_task: ProcessingTask,
    pub error_details: ErrorDetails,
    /// ISO-8601 time the dead-letter handler processed this task.
    pub dlq_processed_at: String,
    pub status: FailureStatus,
}
