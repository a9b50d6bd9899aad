//! Structured error model for pipeline task processing.
//!
//! [`TaskError`] carries classification and retry metadata. Construct via
//! category-specific factory methods; the queue's redelivery policy and the
//! engine's backoff computation both key off the category.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of a task-processing error.
///
/// Determines default retry behavior and operator-facing categorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid pipeline configuration (missing credentials, bad endpoint).
    Config,
    /// Signature rejected by the sink or identity provider.
    Auth,
    /// Transient network or service unavailability (retryable).
    TransientNetwork,
    /// Assembled payload failed schema validation.
    ///
    /// Redelivered identically to transient errors; retrying will not
    /// change the outcome, so these converge to dead-letter.
    Validation,
    /// Invalid or corrupt upstream data (unparseable document, bad vector).
    Data,
    /// Internal pipeline error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Auth => "auth",
            Self::TransientNetwork => "transient_network",
            Self::Validation => "validation",
            Self::Data => "data",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Retry backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffClass {
    /// Millisecond-scale retry.
    Fast,
    /// Second-scale retry.
    Normal,
    /// Minute-scale retry.
    Slow,
}

/// Structured error from processing one task.
///
/// Carries classification and retry metadata. Construct via
/// category-specific factory methods (e.g. [`TaskError::transient`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{category}] {code}: {message}")]
pub struct TaskError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    pub backoff_class: BackoffClass,
}

impl TaskError {
    fn new(
        category: ErrorCategory,
        retryable: bool,
        backoff_class: BackoffClass,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retryable,
            retry_after_ms: None,
            backoff_class,
        }
    }

    /// Invalid configuration; never retryable.
    #[must_use]
    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Config, false, BackoffClass::Slow, code, message)
    }

    /// Authentication failure. Retryable only when attributable to clock
    /// skew (the provider's accepted signing window); otherwise a fatal
    /// configuration problem.
    #[must_use]
    pub fn auth(
        code: impl Into<String>,
        message: impl Into<String>,
        clock_skew_suspected: bool,
    ) -> Self {
        Self::new(
            ErrorCategory::Auth,
            clock_skew_suspected,
            BackoffClass::Normal,
            code,
            message,
        )
    }

    /// Transient network/service failure; retried via queue redelivery.
    #[must_use]
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::TransientNetwork,
            true,
            BackoffClass::Normal,
            code,
            message,
        )
    }

    /// Schema validation failure of an assembled payload.
    ///
    /// Marked retryable so it follows the same queue redelivery path as
    /// transient errors and converges to dead-letter after max attempts.
    #[must_use]
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, true, BackoffClass::Fast, code, message)
    }

    /// Corrupt or unusable upstream data.
    #[must_use]
    pub fn data(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Data, true, BackoffClass::Fast, code, message)
    }

    /// Internal pipeline error; never retryable.
    #[must_use]
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, false, BackoffClass::Slow, code, message)
    }

    /// Attach a provider-supplied retry hint.
    #[must_use]
    pub fn with_retry_after_ms(mut self, ms: u64) -> Self {
        self.retry_after_ms = Some(ms);
        self
    }
}
