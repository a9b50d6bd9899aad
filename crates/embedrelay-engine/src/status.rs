//! Derived document status resolution.
//!
//! No persisted state machine: the status is recomputed on every call
//! from existence checks against the metadata store and the upstream
//! artifact container. Read-only.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use embedrelay_state::StateStore;
use embedrelay_types::artifact::ArtifactKey;
use embedrelay_types::document::EmbeddingStatusDocument;
use embedrelay_types::id::DocumentId;
use embedrelay_types::record::{DocumentStatus, VectorMetadataRecord};

use crate::artifact_store::ArtifactStore;
use crate::error::PipelineError;

/// Freshly computed pipeline view of one document.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub document_id: DocumentId,
    pub status: DocumentStatus,
    /// Human-readable stage label for operators.
    pub stage: &'static str,
    /// ISO-8601 time this report was computed.
    pub timestamp: String,
    /// Present for completed documents.
    pub metadata: Option<VectorMetadataRecord>,
}

/// Read-only resolver over the metadata store and the artifact container.
pub struct StatusResolver {
    state: Arc<dyn StateStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl StatusResolver {
    /// Build a resolver over the given collaborators.
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { state, artifacts }
    }

    /// Resolve a document's pipeline state.
    ///
    /// Checks, in order: terminal success record, terminal failure
    /// record, an upstream status artifact awaiting delivery, otherwise
    /// pending. Never exposes internal retry counts.
    ///
    /// # Errors
    ///
    /// Returns an error for metadata-store or listing failures.
    pub async fn resolve(&self, document_id: &DocumentId) -> Result<StatusReport, PipelineError> {
        let timestamp = Utc::now().to_rfc3339();

        if let Some(record) = self
            .state
            .latest_metadata(document_id)
            .context("reading metadata record")?
        {
            if record.status == DocumentStatus::Completed {
                return Ok(StatusReport {
                    document_id: document_id.clone(),
                    status: DocumentStatus::Completed,
                    stage: "indexed",
                    timestamp,
                    metadata: Some(record),
                });
            }
        }

        if self
            .state
            .latest_failure(document_id)
            .context("reading failure record")?
            .is_some()
        {
            return Ok(StatusReport {
                document_id: document_id.clone(),
                status: DocumentStatus::Failed,
                stage: "dead_letter",
                timestamp,
                metadata: None,
            });
        }

        if self.upstream_artifact_exists(document_id).await? {
            return Ok(StatusReport {
                document_id: document_id.clone(),
                status: DocumentStatus::Processing,
                stage: "awaiting_delivery",
                timestamp,
                metadata: None,
            });
        }

        Ok(StatusReport {
            document_id: document_id.clone(),
            status: DocumentStatus::Pending,
            stage: "not_started",
            timestamp,
            metadata: None,
        })
    }

    /// Whether a fully-completed status artifact for this document is
    /// still sitting upstream. Artifact keys encode a content hash, not
    /// the document id, so each candidate is opened to check; delivered
    /// artifacts are deleted by the worker, keeping the set small.
    async fn upstream_artifact_exists(
        &self,
        document_id: &DocumentId,
    ) -> Result<bool, PipelineError> {
        let raw_keys = self.artifacts.list().await.context("listing artifacts")?;
        for raw in raw_keys {
            let Some(key) = ArtifactKey::parse(&raw) else {
                continue;
            };
            let Ok(bytes) = self.artifacts.get(key.as_str()).await else {
                // Deleted between list and get; treat as absent.
                continue;
            };
            match serde_json::from_slice::<EmbeddingStatusDocument>(&bytes) {
                Ok(doc) if doc.document_id == *document_id => return Ok(true),
                Ok(_) | Err(_) => {}
            }
        }
        Ok(false)
    }
}
