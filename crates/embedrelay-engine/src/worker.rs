//! Concurrent delivery worker.
//!
//! Consumes a bounded batch of queue deliveries with a bounded-concurrency
//! pool (each in-flight item carries full-length float vectors, and the
//! external sink is load-capped). Items are failure-isolated: the queue is
//! acked or failed per delivery, so redelivery only covers the failed
//! subset of a batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use embedrelay_queue::{Delivery, TaskQueue};
use embedrelay_state::StateStore;
use embedrelay_types::document::{ChunkMetadata, EmbeddingStatusDocument, UpsertChunk};
use embedrelay_types::error::{ErrorCategory, TaskError};
use embedrelay_types::id::PipelineId;
use embedrelay_types::record::{DocumentStatus, Provenance, VectorMetadataRecord};
use embedrelay_types::task::ProcessingTask;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::artifact_store::ArtifactStore;
use crate::error::{compute_backoff, PipelineError};
use crate::signer::RequestSigner;
use crate::sink::VectorSink;
use crate::validate::validate_chunks;

/// A failure that retrying cannot heal and that needs operator attention
/// (a rejected signature or a broken pipeline configuration). These log
/// at error level; everything else is routine redelivery noise.
fn is_fatal(err: &TaskError) -> bool {
    !err.retryable && matches!(err.category, ErrorCategory::Auth | ErrorCategory::Config)
}

/// Summary of one worker batch, for logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkOutcome {
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Delivery worker service struct.
///
/// Constructed once per worker instance and shared by reference; all
/// collaborators are explicit, with no lazily-initialized module state.
pub struct Worker {
    pipeline: PipelineId,
    batch_size: usize,
    concurrency: usize,
    artifacts: Arc<dyn ArtifactStore>,
    queue: Arc<dyn TaskQueue>,
    state: Arc<dyn StateStore>,
    signer: Arc<RequestSigner>,
    sink: Arc<dyn VectorSink>,
    upsert_url: String,
}

impl Worker {
    /// Build a worker over the given collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline: PipelineId,
        batch_size: usize,
        concurrency: usize,
        artifacts: Arc<dyn ArtifactStore>,
        queue: Arc<dyn TaskQueue>,
        state: Arc<dyn StateStore>,
        signer: Arc<RequestSigner>,
        sink: Arc<dyn VectorSink>,
        upsert_url: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
            artifacts,
            queue,
            state,
            signer,
            sink,
            upsert_url: upsert_url.into(),
        }
    }

    /// Receive one batch and process each delivery independently.
    ///
    /// # Errors
    ///
    /// Returns an error only for queue/storage infrastructure failures;
    /// per-item processing errors are reported to the queue via `fail`
    /// and absorbed into the outcome counts.
    pub async fn run_once(self: &Arc<Self>) -> Result<WorkOutcome, PipelineError> {
        let deliveries = self
            .queue
            .receive(self.batch_size)
            .context("receiving batch")?;
        let received = deliveries.len();
        if received == 0 {
            return Ok(WorkOutcome::default());
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set: JoinSet<(Delivery, Result<(), TaskError>)> = JoinSet::new();

        for delivery in deliveries {
            let worker = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                // Closed only when the set is dropped; safe to unwrap here.
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                let result = worker.process_task(&delivery.task).await;
                (delivery, result)
            });
        }

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        while let Some(joined) = join_set.join_next().await {
            let (delivery, result) = joined.map_err(|e| {
                PipelineError::Infrastructure(anyhow::anyhow!("delivery task panicked: {e}"))
            })?;
            match result {
                Ok(()) => {
                    self.queue.ack(&delivery).context("acking delivery")?;
                    succeeded += 1;
                }
                Err(err) => {
                    // Retryable errors back off before redelivery;
                    // non-retryable ones converge to dead-letter without
                    // delay.
                    let retry_delay = if err.retryable {
                        compute_backoff(&err, delivery.attempt)
                    } else {
                        Duration::ZERO
                    };
                    if is_fatal(&err) {
                        tracing::error!(
                            pipeline = self.pipeline.as_str(),
                            key = delivery.task.artifact_key.as_str(),
                            attempt = delivery.attempt,
                            category = %err.category,
                            code = err.code,
                            error = %err,
                            "Delivery failed, not retryable"
                        );
                    } else {
                        tracing::warn!(
                            pipeline = self.pipeline.as_str(),
                            key = delivery.task.artifact_key.as_str(),
                            attempt = delivery.attempt,
                            category = %err.category,
                            code = err.code,
                            retry_delay_ms = u64::try_from(retry_delay.as_millis()).unwrap_or(u64::MAX),
                            error = %err,
                            "Delivery failed, returning to queue"
                        );
                    }
                    self.queue
                        .fail(&delivery, retry_delay)
                        .context("failing delivery")?;
                    failed += 1;
                }
            }
        }

        tracing::info!(
            pipeline = self.pipeline.as_str(),
            received,
            succeeded,
            failed,
            "Worker batch complete"
        );
        Ok(WorkOutcome {
            received,
            succeeded,
            failed,
        })
    }

    /// Process a single task end to end:
    /// download → assemble → validate → sign → upsert → record → cleanup.
    async fn process_task(&self, task: &ProcessingTask) -> Result<(), TaskError> {
        let started = Instant::now();
        let document = self.fetch_status_document(task).await?;
        let chunks = self.assemble_chunks(&document).await?;

        // Strict schema check before any network call; a failure here
        // aborts with no side effects.
        validate_chunks(&chunks)?;

        let request_id = Uuid::new_v4().to_string();
        let headers = self
            .signer
            .sign("POST", &self.upsert_url, b"", &request_id)
            .map_err(|e| TaskError::config("SIGNING_FAILED", e.to_string()))?;

        let sink_response = self.sink.upsert(&chunks, &headers).await?;

        #[allow(clippy::cast_possible_truncation)]
        let processing_time_ms = started.elapsed().as_millis() as u64;
        let record = VectorMetadataRecord {
            document_id: document.document_id.clone(),
            status: DocumentStatus::Completed,
            indexed_at: Utc::now().to_rfc3339(),
            processing_time_ms,
            summary: document.summary.clone(),
            sink_response,
            provenance: Provenance {
                source_key: task.artifact_key.as_str().to_string(),
                source_container: task.container.clone(),
                request_id,
            },
        };
        self.state
            .insert_metadata_record(&record)
            .map_err(|e| TaskError::internal("METADATA_WRITE", e.to_string()))?;

        // Cleanup is ordered after the durable write: a crash between the
        // two leaves the source intact for a safe re-run.
        if let Err(e) = self.artifacts.delete(task.artifact_key.as_str()).await {
            tracing::warn!(
                pipeline = self.pipeline.as_str(),
                key = task.artifact_key.as_str(),
                error = %e,
                "Source cleanup failed; redelivery will retry the delete"
            );
        }

        tracing::info!(
            pipeline = self.pipeline.as_str(),
            document = document.document_id.as_str(),
            chunks = chunks.len(),
            processing_time_ms,
            "Document delivered to sink"
        );
        Ok(())
    }

    async fn fetch_status_document(
        &self,
        task: &ProcessingTask,
    ) -> Result<EmbeddingStatusDocument, TaskError> {
        let bytes = self
            .artifacts
            .get(task.artifact_key.as_str())
            .await
            .map_err(|e| TaskError::transient("STATUS_DOC_FETCH", e.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| TaskError::data("MALFORMED_STATUS_DOC", e.to_string()))
    }

    /// Download text and vector for every chunk reference and assemble
    /// upsert chunks. A failure to prepare one chunk skips that chunk
    /// (partial delivery beats losing the document on one bad chunk);
    /// zero survivors fails the task.
    async fn assemble_chunks(
        &self,
        document: &EmbeddingStatusDocument,
    ) -> Result<Vec<UpsertChunk>, TaskError> {
        let mut chunks = Vec::with_capacity(document.chunk_references.len());
        for reference in &document.chunk_references {
            // Text and vector fetches for one chunk run in parallel.
            let fetched = tokio::try_join!(
                self.artifacts.get(&reference.content_ref),
                self.artifacts.get(&reference.vector_ref)
            );
            let (text_bytes, vector_bytes) = match fetched {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(
                        document = document.document_id.as_str(),
                        chunk = reference.chunk_id.as_str(),
                        error = %e,
                        "Skipping chunk: fetch failed"
                    );
                    continue;
                }
            };

            let text = match String::from_utf8(text_bytes) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        document = document.document_id.as_str(),
                        chunk = reference.chunk_id.as_str(),
                        error = %e,
                        "Skipping chunk: text is not UTF-8"
                    );
                    continue;
                }
            };
            let vector: Vec<f32> = match serde_json::from_slice(&vector_bytes) {
                Ok(vector) => vector,
                Err(e) => {
                    tracing::warn!(
                        document = document.document_id.as_str(),
                        chunk = reference.chunk_id.as_str(),
                        error = %e,
                        "Skipping chunk: vector is not a float array"
                    );
                    continue;
                }
            };

            chunks.push(UpsertChunk {
                document_id: document.document_id.clone(),
                chunk_id: reference.chunk_id.clone(),
                text,
                vector,
                source_ref: document.original_document_ref.clone(),
                metadata: ChunkMetadata {
                    chunk_index: reference.chunk_index,
                    total_chunks: document.summary.total_chunks,
                    model: document.summary.model.clone(),
                },
            });
        }

        if chunks.is_empty() {
            return Err(TaskError::data(
                "NO_CHUNKS_SURVIVED",
                format!(
                    "all {} chunk references failed to assemble",
                    document.chunk_references.len()
                ),
            ));
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_without_skew_is_fatal() {
        assert!(is_fatal(&TaskError::auth("SIG_REJECTED", "403", false)));
        assert!(is_fatal(&TaskError::config("BAD_ENDPOINT", "no scheme")));
    }

    #[test]
    fn skewed_auth_and_transient_are_routine() {
        assert!(!is_fatal(&TaskError::auth("SIG_REJECTED", "skew", true)));
        assert!(!is_fatal(&TaskError::transient("SINK_UNAVAILABLE", "503")));
        assert!(!is_fatal(&TaskError::data("MALFORMED_STATUS_DOC", "eof")));
        assert!(!is_fatal(&TaskError::internal("METADATA_WRITE", "disk")));
    }
}
