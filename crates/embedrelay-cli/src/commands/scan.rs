use std::path::Path;

use anyhow::Result;

use crate::commands::load_runtime;

/// Execute the `scan` command: one scanner tick.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let (config, runtime) = load_runtime(pipeline_path)?;
    let outcome = runtime.scanner.run_once().await?;

    println!("Scan of pipeline '{}' complete.", config.pipeline);
    println!("  Keys listed:          {}", outcome.listed);
    println!("  New candidates:       {}", outcome.candidates);
    println!("  Tasks enqueued:       {}", outcome.enqueued);
    println!(
        "  Checkpoint advanced:  {}",
        if outcome.checkpoint_advanced { "yes" } else { "no" }
    );
    Ok(())
}
