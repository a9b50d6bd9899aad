//! State store trait definition.
//!
//! [`StateStore`] defines the storage contract for the scanner checkpoint,
//! vector-metadata audit records, and dead-letter failure records. Model
//! types live in `embedrelay_types`.

use embedrelay_types::checkpoint::CheckpointRecord;
use embedrelay_types::id::{DocumentId, PipelineId};
use embedrelay_types::record::{FailureRecord, VectorMetadataRecord};

use crate::error;

/// Storage contract for pipeline state.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn StateStore>`.
pub trait StateStore: Send + Sync {
    /// Read the current checkpoint for a pipeline.
    ///
    /// Returns `Ok(None)` when no checkpoint has been persisted yet
    /// (start-of-time for the scanner).
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_checkpoint(&self, pipeline: &PipelineId) -> error::Result<Option<CheckpointRecord>>;

    /// Compare-and-swap checkpoint advancement.
    ///
    /// Writes `(timestamp, key)` only if the stored `updated_at` still
    /// equals `expected_updated_at` (`None` means insert-if-absent).
    /// Returns `false` when the token doesn't match, which signals an
    /// overlapping scanner invocation whose write must be discarded.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn advance_checkpoint(
        &self,
        pipeline: &PipelineId,
        timestamp: &str,
        key: &str,
        expected_updated_at: Option<&str>,
    ) -> error::Result<bool>;

    /// Append a vector-metadata audit record. Duplicates are tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn insert_metadata_record(&self, record: &VectorMetadataRecord) -> error::Result<()>;

    /// Most recent metadata record for a document, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn latest_metadata(
        &self,
        document_id: &DocumentId,
    ) -> error::Result<Option<VectorMetadataRecord>>;

    /// Best-effort status flip of a document's metadata records to `failed`.
    ///
    /// Returns the number of rows updated; zero is not an error (the
    /// durable failure record is the record of truth).
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn mark_document_failed(&self, document_id: &DocumentId) -> error::Result<u64>;

    /// Persist a dead-letter failure record.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn insert_failure_record(&self, record: &FailureRecord) -> error::Result<()>;

    /// Most recent failure record for a document, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn latest_failure(&self, document_id: &DocumentId) -> error::Result<Option<FailureRecord>>;
}
