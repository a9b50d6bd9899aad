//! Dead-letter handler.
//!
//! Consumes terminally-failed deliveries one logical task at a time and
//! persists a `FailureRecord` for each. The failure record is the record
//! of truth; flipping the metadata store's status afterwards is
//! best-effort and never escalated.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use embedrelay_queue::{Delivery, TaskQueue};
use embedrelay_state::StateStore;
use embedrelay_types::artifact::ArtifactKey;
use embedrelay_types::id::{DocumentId, PipelineId};
use embedrelay_types::record::{ErrorDetails, FailureRecord, FailureStatus};
use uuid::Uuid;

use crate::error::PipelineError;

/// Document identifier recovered from a dead-lettered task.
///
/// `Parsed` means the artifact key matched the naming convention and the
/// identifier is its content hash; `Guessed` is a derived placeholder for
/// keys that no longer parse. Callers can tell recovery from guesswork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveredId {
    Parsed(DocumentId),
    Guessed(DocumentId),
}

impl RecoveredId {
    /// The identifier, regardless of how it was obtained.
    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::Parsed(id) | Self::Guessed(id) => id,
        }
    }
}

/// Best-effort identifier recovery from a raw artifact key.
///
/// Never errors: a key that fails the naming convention yields a
/// placeholder derived from the task id.
#[must_use]
pub fn recover_document_id(raw_key: &str, task_id: Uuid) -> RecoveredId {
    match ArtifactKey::parse(raw_key) {
        Some(key) => RecoveredId::Parsed(DocumentId::new(key.hash_str())),
        None => RecoveredId::Guessed(DocumentId::new(format!("unrecovered-{task_id}"))),
    }
}

/// Summary of one dead-letter pass, for logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrainOutcome {
    pub received: usize,
    pub recorded: usize,
    pub status_marked: usize,
}

/// Drains the dead-letter channel into durable failure records.
pub struct DeadLetterHandler {
    pipeline: PipelineId,
    batch_size: usize,
    queue: Arc<dyn TaskQueue>,
    state: Arc<dyn StateStore>,
}

impl DeadLetterHandler {
    /// Build a handler over the given collaborators.
    #[must_use]
    pub fn new(
        pipeline: PipelineId,
        batch_size: usize,
        queue: Arc<dyn TaskQueue>,
        state: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            pipeline,
            batch_size: batch_size.max(1),
            queue,
            state,
        }
    }

    /// Drain one batch from the dead-letter channel.
    ///
    /// One item's failure never aborts the batch: a task whose failure
    /// record can't be persisted is left on the channel for a later pass.
    ///
    /// # Errors
    ///
    /// Returns an error only when the dead-letter channel itself can't be
    /// read.
    pub async fn run_once(&self) -> Result<DrainOutcome, PipelineError> {
        let deliveries = self
            .queue
            .receive_dead_letters(self.batch_size)
            .context("receiving dead letters")?;

        let mut outcome = DrainOutcome {
            received: deliveries.len(),
            ..DrainOutcome::default()
        };

        for delivery in &deliveries {
            match self.record_failure(delivery) {
                Ok(marked) => {
                    outcome.recorded += 1;
                    if marked {
                        outcome.status_marked += 1;
                    }
                    if let Err(e) = self.queue.ack(delivery) {
                        tracing::error!(
                            pipeline = self.pipeline.as_str(),
                            delivery_id = delivery.delivery_id,
                            error = %e,
                            "Failed to ack dead letter after recording"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(
                        pipeline = self.pipeline.as_str(),
                        key = delivery.task.artifact_key.as_str(),
                        error = %e,
                        "Failed to persist failure record; leaving on dead-letter channel"
                    );
                }
            }
        }

        if outcome.received > 0 {
            tracing::info!(
                pipeline = self.pipeline.as_str(),
                received = outcome.received,
                recorded = outcome.recorded,
                status_marked = outcome.status_marked,
                "Dead-letter pass complete"
            );
        }
        Ok(outcome)
    }

    /// Persist the failure record; returns whether the metadata status
    /// flip also landed.
    fn record_failure(&self, delivery: &Delivery) -> Result<bool, PipelineError> {
        let recovered =
            recover_document_id(delivery.task.artifact_key.as_str(), delivery.task.task_id);
        let guessed = matches!(recovered, RecoveredId::Guessed(_));
        let document_id = recovered.document_id().clone();

        let record = FailureRecord {
            document_id: document_id.clone(),
            original_task: delivery.task.clone(),
            error_details: ErrorDetails {
                message: format!(
                    "delivery attempts exhausted after {} attempts",
                    delivery.attempt
                ),
                attempt_count: delivery.attempt,
                first_failure_at: delivery.first_received_at.clone(),
                last_failure_at: delivery.last_received_at.clone(),
            },
            dlq_processed_at: Utc::now().to_rfc3339(),
            status: if guessed {
                // A guessed identifier can't be correlated automatically.
                FailureStatus::RequiresManualReview
            } else {
                FailureStatus::Logged
            },
        };

        self.state
            .insert_failure_record(&record)
            .context("persisting failure record")?;

        // Best-effort: the failure record above is the record of truth.
        let marked = match self.state.mark_document_failed(&document_id) {
            Ok(rows) => rows > 0,
            Err(e) => {
                tracing::warn!(
                    pipeline = self.pipeline.as_str(),
                    document = document_id.as_str(),
                    error = %e,
                    "Could not mark metadata status failed"
                );
                false
            }
        };
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recover_parses_conforming_key() {
        let raw = format!("2024-01-01T00:00:00.000Z-{}.json", "ab".repeat(32));
        let recovered = recover_document_id(&raw, Uuid::nil());
        match recovered {
            RecoveredId::Parsed(id) => assert_eq!(id.as_str(), "ab".repeat(32)),
            RecoveredId::Guessed(_) => panic!("expected parsed identifier"),
        }
    }

    #[test]
    fn recover_falls_back_to_placeholder() {
        let recovered = recover_document_id("garbage-key.txt", Uuid::nil());
        match recovered {
            RecoveredId::Guessed(id) => {
                assert!(id.as_str().starts_with("unrecovered-"));
            }
            RecoveredId::Parsed(_) => panic!("expected guessed identifier"),
        }
    }

    #[test]
    fn recovered_id_exposes_inner_document_id() {
        let recovered = recover_document_id("nope", Uuid::nil());
        assert!(recovered.document_id().as_str().contains("unrecovered"));
    }
}
