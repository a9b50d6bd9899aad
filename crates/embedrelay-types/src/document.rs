//! Upstream status documents and the chunks assembled from them.

use serde::{Deserialize, Serialize};

use crate::id::{ChunkId, DocumentId};

/// Aggregate facts about a completed embedding run for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSummary {
    pub total_chunks: u32,
    pub model: String,
    pub total_tokens: u64,
}

/// Pointer to one chunk's text and vector objects in the upstream store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReference {
    pub chunk_id: ChunkId,
    pub chunk_index: u32,
    /// Upstream key of the chunk's text object.
    pub content_ref: String,
    /// Upstream key of the chunk's vector object (JSON float array).
    pub vector_ref: String,
}

/// Upstream artifact summarizing a completed unit of embedding work.
///
/// Produced by the upstream embedding producer; read-only to this pipeline
/// and deleted by the worker after successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingStatusDocument {
    pub document_id: DocumentId,
    pub processing_id: String,
    /// Reference back to the original source document.
    pub original_document_ref: String,
    pub summary: EmbeddingSummary,
    pub chunk_references: Vec<ChunkReference>,
}

/// Per-chunk metadata carried into the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub model: String,
}

/// One chunk as delivered to the external sink's upsert endpoint.
///
/// `chunk_id` is globally stable and is the sink's idempotency key:
/// upserting the same chunk twice leaves one logical entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertChunk {
    pub document_id: DocumentId,
    pub chunk_id: ChunkId,
    pub text: String,
    pub vector: Vec<f32>,
    pub source_ref: String,
    pub metadata: ChunkMetadata,
}
