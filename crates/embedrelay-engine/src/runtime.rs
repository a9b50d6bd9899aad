//! Component wiring from a validated pipeline configuration.
//!
//! Builds the shared storage backends and the three processing loops
//! (scanner, worker, dead-letter handler) plus the read-only status
//! resolver. Callers own the scheduling; everything here is one-shot
//! construction.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use embedrelay_queue::{SqliteTaskQueue, TaskQueue};
use embedrelay_state::{SqliteStateStore, StateStore};
use embedrelay_types::id::PipelineId;

use crate::artifact_store::{ArtifactStore, FsArtifactStore};
use crate::config::PipelineConfig;
use crate::dead_letter::DeadLetterHandler;
use crate::error::PipelineError;
use crate::scanner::Scanner;
use crate::signer::RequestSigner;
use crate::sink::{HttpVectorSink, VectorSink};
use crate::status::StatusResolver;
use crate::worker::Worker;

/// Fully wired pipeline components, ready to run.
pub struct PipelineRuntime {
    pub pipeline: PipelineId,
    pub scanner: Scanner,
    pub worker: Arc<Worker>,
    pub dead_letter: DeadLetterHandler,
    pub status: StatusResolver,
    pub sink: Arc<HttpVectorSink>,
    pub poll_interval: Duration,
}

impl PipelineRuntime {
    /// Build all components from a validated configuration.
    ///
    /// Signer credentials are read from the environment here, so a
    /// misconfigured deployment fails at startup rather than on the
    /// first task.
    ///
    /// # Errors
    ///
    /// Returns an error when a storage backend can't be opened, the sink
    /// endpoint is invalid, or signer credentials are missing.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let pipeline = PipelineId::new(config.pipeline.clone());

        let state: Arc<dyn StateStore> = Arc::new(
            SqliteStateStore::open(Path::new(&config.state.db_path))
                .context("opening state store")?,
        );
        let queue: Arc<dyn TaskQueue> = Arc::new(
            SqliteTaskQueue::open(
                Path::new(&config.queue.db_path),
                Duration::from_secs(config.queue.visibility_timeout_secs),
                config.queue.max_attempts,
            )
            .context("opening task queue")?,
        );
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(FsArtifactStore::new(&config.source.container));

        let signer = Arc::new(
            RequestSigner::from_env(&config.signer.identity_endpoint)
                .context("initializing request signer")?,
        );
        let sink = Arc::new(
            HttpVectorSink::new(
                &config.sink.endpoint,
                Duration::from_secs(config.sink.request_timeout_secs),
            )
            .context("building sink client")?,
        );

        if !config.sink.allowed_identities.is_empty() {
            tracing::info!(
                pipeline = pipeline.as_str(),
                identities = config.sink.allowed_identities.join(","),
                "Sink identity allowlist configured"
            );
        }

        let scanner = Scanner::new(
            pipeline.clone(),
            config.source.container.clone(),
            config.resources.batch_size,
            Arc::clone(&artifacts),
            Arc::clone(&queue),
            Arc::clone(&state),
        );
        let worker = Arc::new(Worker::new(
            pipeline.clone(),
            config.resources.batch_size,
            config.resources.max_concurrency,
            Arc::clone(&artifacts),
            Arc::clone(&queue),
            Arc::clone(&state),
            signer,
            Arc::clone(&sink) as Arc<dyn VectorSink>,
            // The worker signs the exact URL the sink client posts to.
            sink.upsert_url(),
        ));
        let dead_letter = DeadLetterHandler::new(
            pipeline.clone(),
            config.resources.batch_size,
            Arc::clone(&queue),
            Arc::clone(&state),
        );
        let status = StatusResolver::new(Arc::clone(&state), Arc::clone(&artifacts));

        Ok(Self {
            pipeline,
            scanner,
            worker,
            dead_letter,
            status,
            sink,
            poll_interval: Duration::from_secs(config.resources.poll_interval_secs),
        })
    }

    /// One full pipeline tick: scan, drain the work queue, drain the
    /// dead-letter channel. Used by the combined `run` loop.
    ///
    /// # Errors
    ///
    /// Propagates the first loop-level failure as a typed
    /// [`PipelineError`] so the caller can pick log severity from its
    /// retryability; per-task errors are already absorbed by the
    /// individual loops.
    pub async fn tick(&self) -> Result<(), PipelineError> {
        let scan = self.scanner.run_once().await?;
        tracing::debug!(
            pipeline = self.pipeline.as_str(),
            enqueued = scan.enqueued,
            "Scan tick complete"
        );

        loop {
            let work = self.worker.run_once().await?;
            if work.received == 0 {
                break;
            }
        }

        let drained = self.dead_letter.run_once().await?;
        if drained.received > 0 {
            tracing::info!(
                pipeline = self.pipeline.as_str(),
                recorded = drained.recorded,
                "Dead-letter drain tick complete"
            );
        }
        Ok(())
    }
}
