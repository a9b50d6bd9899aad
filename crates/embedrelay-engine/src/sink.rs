//! External vector sink client.
//!
//! The sink exposes `POST <endpoint>/upsert` taking `{ "chunks": [...] }`,
//! authenticated with detached identity-proof headers. Upserts are keyed
//! by chunk id on the sink side, so retrying a delivery is safe.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use embedrelay_types::document::UpsertChunk;
use embedrelay_types::error::TaskError;
use serde::Serialize;

use crate::signer::SignedHeaders;

#[derive(Serialize)]
struct UpsertRequest<'a> {
    chunks: &'a [UpsertChunk],
}

/// Sink reachability probe result.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub reachable: bool,
    pub status: Option<u16>,
    pub latency_ms: u64,
}

/// Write access to the external vector sink.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn VectorSink>`.
#[async_trait]
pub trait VectorSink: Send + Sync {
    /// Upsert a batch of chunks, returning the sink's JSON response body.
    ///
    /// Idempotent per chunk id: repeating the call leaves the sink in the
    /// same state.
    async fn upsert(
        &self,
        chunks: &[UpsertChunk],
        headers: &SignedHeaders,
    ) -> Result<serde_json::Value, TaskError>;
}

/// HTTP implementation of [`VectorSink`].
pub struct HttpVectorSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVectorSink {
    /// Build a client for the sink at `endpoint` with a bounded
    /// per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error for non-http(s) endpoints or if the underlying
    /// client can't be constructed.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            "sink endpoint must be an http(s) URL"
        );
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build sink HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// The configured upsert URL.
    #[must_use]
    pub fn upsert_url(&self) -> String {
        format!("{}/upsert", self.endpoint)
    }

    /// Probe `GET <endpoint>/health`, reporting reachability and latency.
    pub async fn health(&self) -> HealthReport {
        let url = format!("{}/health", self.endpoint);
        let started = Instant::now();
        let result = self.client.get(&url).send().await;
        #[allow(clippy::cast_possible_truncation)]
        let latency_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(resp) => HealthReport {
                reachable: resp.status().is_success(),
                status: Some(resp.status().as_u16()),
                latency_ms,
            },
            Err(_) => HealthReport {
                reachable: false,
                status: None,
                latency_ms,
            },
        }
    }

    fn classify_status(
        status: reqwest::StatusCode,
        body: &str,
        retry_after_ms: Option<u64>,
    ) -> TaskError {
        let code = status.as_u16();
        match code {
            401 | 403 => {
                let lowered = body.to_ascii_lowercase();
                let clock_skew =
                    lowered.contains("skew") || lowered.contains("expired") || lowered.contains("too old");
                TaskError::auth(
                    "SINK_REJECTED_SIGNATURE",
                    format!("sink returned {code}: {body}"),
                    clock_skew,
                )
            }
            408 | 429 | 500..=599 => {
                let err = TaskError::transient("SINK_UNAVAILABLE", format!("sink returned {code}"));
                match retry_after_ms {
                    Some(ms) => err.with_retry_after_ms(ms),
                    None => err,
                }
            }
            _ => TaskError::data("SINK_REJECTED_PAYLOAD", format!("sink returned {code}: {body}")),
        }
    }
}

#[async_trait]
impl VectorSink for HttpVectorSink {
    async fn upsert(
        &self,
        chunks: &[UpsertChunk],
        headers: &SignedHeaders,
    ) -> Result<serde_json::Value, TaskError> {
        let mut request = self
            .client
            .post(self.upsert_url())
            .json(&UpsertRequest { chunks });
        for (name, value) in headers.as_pairs() {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TaskError::transient("SINK_TIMEOUT", e.to_string())
            } else {
                TaskError::transient("SINK_UNREACHABLE", e.to_string())
            }
        })?;

        let status = response.status();
        // Delta-seconds Retry-After only; HTTP-date values are ignored.
        let retry_after_ms = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1_000));
        let body = response
            .text()
            .await
            .map_err(|e| TaskError::transient("SINK_BODY_READ", e.to_string()))?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &body, retry_after_ms));
        }

        // HTML error pages behind a 200 are still failures, not sink acks.
        serde_json::from_str(&body).map_err(|_| {
            TaskError::data(
                "MALFORMED_SINK_RESPONSE",
                format!("expected JSON response, got: {}", truncate(&body, 120)),
            )
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedrelay_types::error::ErrorCategory;

    #[test]
    fn rejects_non_http_endpoint() {
        assert!(HttpVectorSink::new("vectors.example.com", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn upsert_url_strips_trailing_slash() {
        let sink = HttpVectorSink::new("https://vectors.example.com/", Duration::from_secs(5))
            .unwrap();
        assert_eq!(sink.upsert_url(), "https://vectors.example.com/upsert");
    }

    #[test]
    fn auth_status_classified_with_skew_detection() {
        let err = HttpVectorSink::classify_status(
            reqwest::StatusCode::FORBIDDEN,
            "signature expired",
            None,
        );
        assert_eq!(err.category, ErrorCategory::Auth);
        assert!(err.retryable);

        let err = HttpVectorSink::classify_status(
            reqwest::StatusCode::FORBIDDEN,
            "signature mismatch",
            None,
        );
        assert_eq!(err.category, ErrorCategory::Auth);
        assert!(!err.retryable);
    }

    #[test]
    fn server_errors_are_transient() {
        let err = HttpVectorSink::classify_status(
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
            "<html>try later</html>",
            None,
        );
        assert_eq!(err.category, ErrorCategory::TransientNetwork);
        assert!(err.retryable);
        assert_eq!(err.retry_after_ms, None);
    }

    #[test]
    fn retry_after_header_becomes_backoff_hint() {
        let err = HttpVectorSink::classify_status(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "slow down",
            Some(2_000),
        );
        assert_eq!(err.category, ErrorCategory::TransientNetwork);
        assert_eq!(err.retry_after_ms, Some(2_000));
    }

    #[test]
    fn client_errors_are_data_failures() {
        let err = HttpVectorSink::classify_status(
            reqwest::StatusCode::BAD_REQUEST,
            "bad vector dim",
            None,
        );
        assert_eq!(err.category, ErrorCategory::Data);
    }

    #[test]
    fn truncate_handles_short_and_long() {
        assert_eq!(truncate("short", 120), "short");
        let long = "x".repeat(200);
        assert_eq!(truncate(&long, 120).len(), 120);
    }
}
