//! Pipeline YAML configuration types.

use serde::{Deserialize, Serialize};

/// Top-level pipeline configuration, parsed from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Config schema version; only "1.0" is accepted.
    pub version: String,
    /// Pipeline name, used as the checkpoint key.
    pub pipeline: String,
    pub source: SourceConfig,
    pub queue: QueueConfig,
    pub state: StateConfig,
    pub sink: SinkConfig,
    pub signer: SignerConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
}

/// Upstream artifact container to scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory holding status artifacts at its root.
    pub container: String,
}

/// Task queue storage and redelivery policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// SQLite file backing the queue; `:memory:` for tests.
    pub db_path: String,
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Checkpoint / metadata / failure-record storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// SQLite file backing pipeline state; `:memory:` for tests.
    pub db_path: String,
}

/// External vector sink endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Base URL of the sink's upsert endpoint.
    pub endpoint: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Identities the sink is expected to accept; informational, logged
    /// at startup.
    #[serde(default)]
    pub allowed_identities: Vec<String>,
}

/// Request-signing trust bridge settings. Credentials come from the
/// environment, never from this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Logical endpoint the signature is scoped to.
    pub identity_endpoint: String,
}

/// Throughput and concurrency knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_visibility_timeout_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    25
}

fn default_max_concurrency() -> usize {
    4
}

fn default_poll_interval_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_defaults() {
        let r = ResourceConfig::default();
        assert_eq!(r.batch_size, 25);
        assert_eq!(r.max_concurrency, 4);
        assert_eq!(r.poll_interval_secs, 60);
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let yaml = r#"
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
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.queue.visibility_timeout_secs, 300);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.sink.request_timeout_secs, 30);
        assert!(config.sink.allowed_identities.is_empty());
        assert_eq!(config.resources.batch_size, 25);
    }
}
