use std::path::Path;

use anyhow::Result;

use crate::commands::load_runtime;

/// Execute the `run` command: tick the full pipeline on an interval
/// until interrupted, or once with `--once`.
pub async fn execute(pipeline_path: &Path, once: bool) -> Result<()> {
    let (config, runtime) = load_runtime(pipeline_path)?;
    tracing::info!(
        pipeline = config.pipeline,
        container = config.source.container,
        sink = config.sink.endpoint,
        poll_interval_secs = config.resources.poll_interval_secs,
        "Pipeline validated"
    );

    if once {
        runtime.tick().await?;
        println!("Pipeline '{}' completed one tick.", config.pipeline);
        return Ok(());
    }

    let mut interval = tokio::time::interval(runtime.poll_interval);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = runtime.tick().await {
                    // Failures don't kill the loop; the next tick retries
                    // from durable state. Retryable task errors are
                    // routine, anything else needs operator attention.
                    let code = e.as_task_error().map_or("", |t| t.code.as_str());
                    if e.is_retryable() {
                        tracing::warn!(pipeline = config.pipeline, code, error = %e, "Pipeline tick failed, will retry");
                    } else {
                        tracing::error!(pipeline = config.pipeline, code, error = %e, "Pipeline tick failed");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(pipeline = config.pipeline, "Shutdown requested");
                break;
            }
        }
    }
    Ok(())
}
