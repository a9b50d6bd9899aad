use std::path::Path;

use anyhow::Result;

use crate::commands::load_runtime;

/// Execute the `health` command: probe the sink endpoint.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let (config, runtime) = load_runtime(pipeline_path)?;
    let report = runtime.sink.health().await;

    println!("Sink {}", config.sink.endpoint);
    println!(
        "  Reachable: {}",
        if report.reachable { "yes" } else { "no" }
    );
    match report.status {
        Some(status) => println!("  Status:    {status}"),
        None => println!("  Status:    (no response)"),
    }
    println!("  Latency:   {} ms", report.latency_ms);

    if !report.reachable {
        anyhow::bail!("sink health check failed");
    }
    Ok(())
}
