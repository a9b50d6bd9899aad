//! Periodic artifact scanner.
//!
//! Discovers new upstream status artifacts past the checkpoint and turns
//! them into ordered queue tasks. The checkpoint only ever advances to
//! the last *contiguously* enqueued artifact: a mid-batch enqueue failure
//! caps progress at the last success, so the next run re-discovers and
//! retries the remainder. Artifacts re-enqueued that way are absorbed by
//! the worker's idempotent upsert.

use std::sync::Arc;

use anyhow::Context;
use embedrelay_queue::TaskQueue;
use embedrelay_state::StateStore;
use embedrelay_types::artifact::ArtifactKey;
use embedrelay_types::id::PipelineId;
use embedrelay_types::task::ProcessingTask;

use crate::artifact_store::ArtifactStore;
use crate::error::PipelineError;

/// Summary of one scanner tick, for logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOutcome {
    /// Raw keys returned by the container listing.
    pub listed: usize,
    /// Keys matching the naming convention and past the checkpoint.
    pub candidates: usize,
    /// Tasks successfully enqueued this tick.
    pub enqueued: usize,
    /// Whether the checkpoint write was applied (false on no progress or
    /// on a rejected stale write).
    pub checkpoint_advanced: bool,
}

/// Stateless per-tick scanner over one pipeline's artifact container.
pub struct Scanner {
    pipeline: PipelineId,
    container: String,
    batch_size: usize,
    artifacts: Arc<dyn ArtifactStore>,
    queue: Arc<dyn TaskQueue>,
    state: Arc<dyn StateStore>,
}

impl Scanner {
    /// Build a scanner over the given collaborators.
    #[must_use]
    pub fn new(
        pipeline: PipelineId,
        container: impl Into<String>,
        batch_size: usize,
        artifacts: Arc<dyn ArtifactStore>,
        queue: Arc<dyn TaskQueue>,
        state: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            pipeline,
            container: container.into(),
            batch_size: batch_size.max(1),
            artifacts,
            queue,
            state,
        }
    }

    /// Run one scan tick.
    ///
    /// # Errors
    ///
    /// Propagates listing/storage failures and the first enqueue failure
    /// to the invoking scheduler; the checkpoint is still advanced to the
    /// last contiguous success before returning.
    pub async fn run_once(&self) -> Result<ScanOutcome, PipelineError> {
        let checkpoint = self
            .state
            .get_checkpoint(&self.pipeline)
            .context("reading checkpoint")?;

        let raw_keys = self.artifacts.list().await.context("listing artifacts")?;
        let listed = raw_keys.len();

        // Non-matching keys are ignored, not errors.
        let mut candidates: Vec<ArtifactKey> = raw_keys
            .iter()
            .filter_map(|raw| ArtifactKey::parse(raw))
            .collect();
        candidates.sort();

        if let Some(cp) = &checkpoint {
            let cutoff = cp.last_processed_timestamp.as_str();
            candidates.retain(|key| key.timestamp_str() > cutoff);
        }
        candidates.truncate(self.batch_size);

        let mut enqueued: Vec<&ArtifactKey> = Vec::new();
        let mut first_failure: Option<anyhow::Error> = None;
        for key in &candidates {
            let task = ProcessingTask::new(key.clone(), self.container.clone());
            match self.queue.enqueue(&task) {
                Ok(()) => enqueued.push(key),
                Err(e) => {
                    // Stop at the first failure: advancing past it would
                    // checkpoint over a gap.
                    tracing::error!(
                        pipeline = self.pipeline.as_str(),
                        key = key.as_str(),
                        error = %e,
                        "Enqueue failed, stopping scan"
                    );
                    first_failure = Some(anyhow::Error::new(e).context("enqueueing task"));
                    break;
                }
            }
        }

        let checkpoint_advanced = if let Some(last) = enqueued.last() {
            let expected = checkpoint.as_ref().map(|cp| cp.updated_at.as_str());
            let applied = self
                .state
                .advance_checkpoint(
                    &self.pipeline,
                    last.timestamp_str(),
                    last.as_str(),
                    expected,
                )
                .context("advancing checkpoint")?;
            if applied {
                tracing::info!(
                    pipeline = self.pipeline.as_str(),
                    listed,
                    enqueued = enqueued.len(),
                    checkpoint = last.as_str(),
                    "Checkpoint advanced"
                );
            } else {
                tracing::warn!(
                    pipeline = self.pipeline.as_str(),
                    checkpoint = last.as_str(),
                    "Stale checkpoint write rejected; overlapping scanner invocation suspected"
                );
            }
            applied
        } else {
            false
        };

        let outcome = ScanOutcome {
            listed,
            candidates: candidates.len(),
            enqueued: enqueued.len(),
            checkpoint_advanced,
        };

        match first_failure {
            Some(err) => Err(PipelineError::Infrastructure(err)),
            None => Ok(outcome),
        }
    }
}
