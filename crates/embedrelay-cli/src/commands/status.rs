use std::path::Path;

use anyhow::Result;
use embedrelay_types::id::DocumentId;

use crate::commands::load_runtime;

/// Execute the `status` command: resolve and print one document's state.
pub async fn execute(pipeline_path: &Path, document_id: &str) -> Result<()> {
    let (_config, runtime) = load_runtime(pipeline_path)?;
    let report = runtime.status.resolve(&DocumentId::new(document_id)).await?;

    println!("Document {}", report.document_id.as_str());
    println!("  Status:      {}", report.status);
    println!("  Stage:       {}", report.stage);
    println!("  Resolved at: {}", report.timestamp);
    if let Some(metadata) = &report.metadata {
        println!("  Indexed at:  {}", metadata.indexed_at);
        println!("  Chunks:      {}", metadata.summary.total_chunks);
        println!("  Model:       {}", metadata.summary.model);
        println!(
            "  Sink response: {}",
            serde_json::to_string(&metadata.sink_response)?
        );
    }
    Ok(())
}
