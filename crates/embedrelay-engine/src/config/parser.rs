//! Pipeline YAML loading.
//!
//! Files may reference environment variables as `${NAME}` so that sink
//! endpoints and container paths can stay out of version control. All
//! placeholders are expanded in one pass before deserialization; any that
//! are unset are reported together.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::PipelineConfig;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"));

/// Expand every `${NAME}` placeholder from the process environment.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is unset.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut unset = Vec::new();
    let expanded = PLACEHOLDER_RE.replace_all(input, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        std::env::var(name).unwrap_or_else(|_| {
            unset.push(name.to_string());
            String::new()
        })
    });

    if !unset.is_empty() {
        anyhow::bail!(
            "pipeline file references unset environment variable(s): {}",
            unset.join(", ")
        );
    }
    Ok(expanded.into_owned())
}

/// Parse pipeline YAML from a string, expanding placeholders first.
///
/// # Errors
///
/// Returns an error if a placeholder is unset or the YAML does not
/// deserialize into a pipeline definition.
pub fn parse_pipeline_str(yaml_str: &str) -> Result<PipelineConfig> {
    let expanded = substitute_env_vars(yaml_str)?;
    serde_yaml::from_str(&expanded).context("parsing pipeline YAML")
}

/// Parse a pipeline YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its content does not
/// parse.
pub fn parse_pipeline(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading pipeline file {}", path.display()))?;
    parse_pipeline_str(&content)
}
