//! Strict schema validation of assembled upsert payloads.
//!
//! Runs before any network call; a validation failure aborts the task
//! with no side effects.

use embedrelay_types::document::UpsertChunk;
use embedrelay_types::error::TaskError;

/// Validate an assembled chunk collection against the sink schema.
///
/// Checks: non-empty collection, non-empty text and vector per chunk,
/// finite vector values, a single consistent vector dimension across the
/// collection, and chunk indexes within the declared total.
///
/// # Errors
///
/// Returns a [`TaskError`] with category `validation` listing every
/// violation found.
pub fn validate_chunks(chunks: &[UpsertChunk]) -> Result<(), TaskError> {
    let mut errors = Vec::new();

    if chunks.is_empty() {
        errors.push("chunk collection is empty".to_string());
    }

    let expected_dim = chunks.first().map(|c| c.vector.len()).unwrap_or_default();

    for chunk in chunks {
        let id = chunk.chunk_id.as_str();
        if chunk.text.trim().is_empty() {
            errors.push(format!("chunk {id}: empty text"));
        }
        if chunk.vector.is_empty() {
            errors.push(format!("chunk {id}: empty vector"));
        } else if chunk.vector.len() != expected_dim {
            errors.push(format!(
                "chunk {id}: vector dimension {} differs from {}",
                chunk.vector.len(),
                expected_dim
            ));
        }
        if chunk.vector.iter().any(|v| !v.is_finite()) {
            errors.push(format!("chunk {id}: non-finite vector value"));
        }
        if chunk.metadata.chunk_index >= chunk.metadata.total_chunks {
            errors.push(format!(
                "chunk {id}: index {} out of range for {} chunks",
                chunk.metadata.chunk_index, chunk.metadata.total_chunks
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TaskError::validation("PAYLOAD_SCHEMA", errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedrelay_types::document::ChunkMetadata;
    use embedrelay_types::id::{ChunkId, DocumentId};

    fn chunk(index: u32, text: &str, vector: Vec<f32>) -> UpsertChunk {
        UpsertChunk {
            document_id: DocumentId::new("doc-1"),
            chunk_id: ChunkId::new(format!("doc-1#{index}")),
            text: text.into(),
            vector,
            source_ref: "originals/doc-1.pdf".into(),
            metadata: ChunkMetadata {
                chunk_index: index,
                total_chunks: 4,
                model: "text-embed-small".into(),
            },
        }
    }

    #[test]
    fn accepts_well_formed_collection() {
        let chunks = vec![
            chunk(0, "first", vec![0.1, 0.2]),
            chunk(1, "second", vec![0.3, 0.4]),
        ];
        validate_chunks(&chunks).unwrap();
    }

    #[test]
    fn rejects_empty_collection() {
        let err = validate_chunks(&[]).unwrap_err();
        assert!(err.message.contains("empty"));
    }

    #[test]
    fn rejects_empty_text() {
        let err = validate_chunks(&[chunk(0, "  ", vec![0.1])]).unwrap_err();
        assert!(err.message.contains("empty text"));
    }

    #[test]
    fn rejects_empty_vector() {
        let err = validate_chunks(&[chunk(0, "t", vec![])]).unwrap_err();
        assert!(err.message.contains("empty vector"));
    }

    #[test]
    fn rejects_inconsistent_dimensions() {
        let chunks = vec![chunk(0, "a", vec![0.1, 0.2]), chunk(1, "b", vec![0.1])];
        let err = validate_chunks(&chunks).unwrap_err();
        assert!(err.message.contains("dimension"));
    }

    #[test]
    fn rejects_non_finite_values() {
        let err = validate_chunks(&[chunk(0, "t", vec![f32::NAN])]).unwrap_err();
        assert!(err.message.contains("non-finite"));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let err = validate_chunks(&[chunk(9, "t", vec![0.1])]).unwrap_err();
        assert!(err.message.contains("out of range"));
    }

    #[test]
    fn reports_all_violations_at_once() {
        let chunks = vec![chunk(0, "", vec![]), chunk(9, "t", vec![0.1])];
        let err = validate_chunks(&chunks).unwrap_err();
        assert!(err.message.contains("empty text"));
        assert!(err.message.contains("empty vector"));
        assert!(err.message.contains("out of range"));
    }
}
