use std::path::Path;

use anyhow::Result;

use crate::commands::load_runtime;

/// Execute the `drain-dlq` command: turn dead letters into failure records.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let (config, runtime) = load_runtime(pipeline_path)?;

    let mut received = 0usize;
    let mut recorded = 0usize;
    loop {
        let outcome = runtime.dead_letter.run_once().await?;
        received += outcome.received;
        recorded += outcome.recorded;
        // Stop on an empty channel or when a batch makes no progress
        // (items whose records can't be persisted stay on the channel).
        if outcome.received == 0 || outcome.recorded == 0 {
            break;
        }
    }

    println!(
        "Dead-letter channel of pipeline '{}' drained.",
        config.pipeline
    );
    println!("  Tasks received:          {received}");
    println!("  Failure records written: {recorded}");
    Ok(())
}
