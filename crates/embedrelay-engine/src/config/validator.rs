//! Semantic validation for parsed pipeline configuration values.

use anyhow::{bail, Result};

use crate::config::types::PipelineConfig;

/// Validate a parsed pipeline configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_pipeline(config: &PipelineConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported pipeline version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.pipeline.trim().is_empty() {
        errors.push("Pipeline name must not be empty".to_string());
    }

    if config.source.container.trim().is_empty() {
        errors.push("Source container must not be empty".to_string());
    }

    if config.queue.db_path.trim().is_empty() {
        errors.push("Queue db_path must not be empty".to_string());
    }

    if config.queue.max_attempts == 0 {
        errors.push("queue.max_attempts must be at least 1".to_string());
    }

    if config.state.db_path.trim().is_empty() {
        errors.push("State db_path must not be empty".to_string());
    }

    if !config.sink.endpoint.starts_with("http://") && !config.sink.endpoint.starts_with("https://")
    {
        errors.push(format!(
            "Sink endpoint '{}' must be an http(s) URL",
            config.sink.endpoint
        ));
    }

    if config.sink.request_timeout_secs == 0 {
        errors.push("sink.request_timeout_secs must be > 0".to_string());
    }

    if config.signer.identity_endpoint.trim().is_empty() {
        errors.push("Signer identity_endpoint must not be empty".to_string());
    }

    if config.resources.batch_size == 0 {
        errors.push("resources.batch_size must be at least 1".to_string());
    }

    if config.resources.max_concurrency == 0 {
        errors.push("resources.max_concurrency must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Pipeline validation failed:\n  - {}", errors.join("\n  - "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_pipeline_str;

    fn valid_yaml() -> &'static str {
        r#"
version: "1.0"
pipeline: relay
source:
  container: /var/artifacts
queue:
  db_path: queue.db
state:
  db_path: state.db
sink:
  endpoint: https://sink.example.com/upsert
signer:
  identity_endpoint: https://sink.example.com
"#
    }

    #[test]
    fn valid_pipeline_passes() {
        let config = parse_pipeline_str(valid_yaml()).unwrap();
        assert!(validate_pipeline(&config).is_ok());
    }

    #[test]
    fn wrong_version_fails() {
        let yaml = valid_yaml().replace("\"1.0\"", "\"2.0\"");
        let config = parse_pipeline_str(&yaml).unwrap();
        let err = validate_pipeline(&config).unwrap_err().to_string();
        assert!(err.contains("Unsupported pipeline version"));
    }

    #[test]
    fn empty_pipeline_name_fails() {
        let yaml = valid_yaml().replace("pipeline: relay", "pipeline: \"\"");
        let config = parse_pipeline_str(&yaml).unwrap();
        let err = validate_pipeline(&config).unwrap_err().to_string();
        assert!(err.contains("Pipeline name must not be empty"));
    }

    #[test]
    fn non_http_sink_endpoint_fails() {
        let yaml = valid_yaml().replace(
            "endpoint: https://sink.example.com/upsert",
            "endpoint: ftp://sink.example.com",
        );
        let config = parse_pipeline_str(&yaml).unwrap();
        let err = validate_pipeline(&config).unwrap_err().to_string();
        assert!(err.contains("http(s)"));
    }

    #[test]
    fn zero_max_attempts_fails() {
        let yaml = valid_yaml().replace(
            "queue:\n  db_path: queue.db",
            "queue:\n  db_path: queue.db\n  max_attempts: 0",
        );
        let config = parse_pipeline_str(&yaml).unwrap();
        let err = validate_pipeline(&config).unwrap_err().to_string();
        assert!(err.contains("max_attempts"));
    }

    #[test]
    fn zero_batch_size_fails() {
        let yaml = format!(
            "{}\nresources:\n  batch_size: 0\n",
            valid_yaml().trim_end()
        );
        let config = parse_pipeline_str(&yaml).unwrap();
        let err = validate_pipeline(&config).unwrap_err().to_string();
        assert!(err.contains("batch_size"));
    }

    #[test]
    fn multiple_errors_all_reported() {
        let yaml = valid_yaml()
            .replace("\"1.0\"", "\"9.9\"")
            .replace("pipeline: relay", "pipeline: \"\"");
        let config = parse_pipeline_str(&yaml).unwrap();
        let err = validate_pipeline(&config).unwrap_err().to_string();
        assert!(err.contains("Unsupported pipeline version"));
        assert!(err.contains("Pipeline name must not be empty"));
    }
}
