use std::path::Path;

use anyhow::Result;

use crate::commands::load_runtime;

/// Execute the `work` command: drain the work queue batch by batch.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let (config, runtime) = load_runtime(pipeline_path)?;

    let mut received = 0usize;
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    loop {
        let outcome = runtime.worker.run_once().await?;
        if outcome.received == 0 {
            break;
        }
        received += outcome.received;
        succeeded += outcome.succeeded;
        failed += outcome.failed;
    }

    println!("Work queue of pipeline '{}' drained.", config.pipeline);
    println!("  Deliveries received: {received}");
    println!("  Succeeded:           {succeeded}");
    println!("  Failed (retryable):  {failed}");
    Ok(())
}
