pub mod drain_dlq;
pub mod health;
pub mod run;
pub mod scan;
pub mod status;
pub mod work;

use std::path::Path;

use anyhow::{Context, Result};
use embedrelay_engine::config::{self, PipelineConfig};
use embedrelay_engine::runtime::PipelineRuntime;

/// Parse, validate, and wire a pipeline from its YAML file.
pub fn load_runtime(pipeline_path: &Path) -> Result<(PipelineConfig, PipelineRuntime)> {
    let config = config::parse_pipeline(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))?;
    config::validate_pipeline(&config)?;
    let runtime = PipelineRuntime::from_config(&config)?;
    Ok((config, runtime))
}
