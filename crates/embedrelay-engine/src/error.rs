//! Pipeline error model and retry backoff policy helpers.

use std::time::Duration;

use embedrelay_types::error::{BackoffClass, TaskError};

const BACKOFF_FAST_BASE_MS: u64 = 100;
const BACKOFF_NORMAL_BASE_MS: u64 = 1_000;
const BACKOFF_SLOW_BASE_MS: u64 = 5_000;
const BACKOFF_MAX_MS: u64 = 60_000;

/// Categorized pipeline error for retry decisions.
///
/// `Task` wraps a typed [`TaskError`] with retry metadata; the queue's
/// redelivery policy keys off it. `Infrastructure` wraps opaque host-side
/// errors (state store, queue storage, config) that are never retryable
/// at the task level.
#[derive(Debug)]
pub enum PipelineError {
    /// Typed task-processing error with retry metadata.
    Task(TaskError),
    /// Infrastructure error (state store, queue storage, config, etc.)
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task(e) => write!(f, "{e}"),
            Self::Infrastructure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl From<TaskError> for PipelineError {
    fn from(e: TaskError) -> Self {
        Self::Task(e)
    }
}

impl PipelineError {
    /// Returns `true` if this is a typed task error marked retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Task(e) => e.retryable,
            Self::Infrastructure(_) => false,
        }
    }

    /// Returns the typed task error if this is a `Task` variant.
    #[must_use]
    pub fn as_task_error(&self) -> Option<&TaskError> {
        match self {
            Self::Task(e) => Some(e),
            Self::Infrastructure(_) => None,
        }
    }
}

/// Compute retry delay based on error hints and attempt number.
#[must_use]
pub fn compute_backoff(err: &TaskError, attempt: u32) -> Duration {
    // Provider-supplied retry hints win.
    if let Some(ms) = err.retry_after_ms {
        return Duration::from_millis(ms);
    }

    let base_ms: u64 = match err.backoff_class {
        BackoffClass::Fast => BACKOFF_FAST_BASE_MS,
        BackoffClass::Normal => BACKOFF_NORMAL_BASE_MS,
        BackoffClass::Slow => BACKOFF_SLOW_BASE_MS,
    };

    let delay_ms = base_ms.saturating_mul(2u64.pow(attempt.saturating_sub(1).min(16)));
    Duration::from_millis(delay_ms.min(BACKOFF_MAX_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedrelay_types::error::ErrorCategory;

    #[test]
    fn task_error_retryability_flows_through() {
        let err = PipelineError::Task(TaskError::transient("CONN_RESET", "reset by peer"));
        assert!(err.is_retryable());
        assert_eq!(
            err.as_task_error().unwrap().category,
            ErrorCategory::TransientNetwork
        );
    }

    #[test]
    fn infrastructure_never_retryable() {
        let err = PipelineError::Infrastructure(anyhow::anyhow!("queue db unreachable"));
        assert!(!err.is_retryable());
        assert!(err.as_task_error().is_none());
    }

    #[test]
    fn from_anyhow() {
        let pe: PipelineError = anyhow::anyhow!("boom").into();
        assert!(matches!(pe, PipelineError::Infrastructure(_)));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let err = TaskError::transient("X", "y");
        assert_eq!(compute_backoff(&err, 1), Duration::from_millis(1_000));
        assert_eq!(compute_backoff(&err, 2), Duration::from_millis(2_000));
        assert_eq!(compute_backoff(&err, 3), Duration::from_millis(4_000));
    }

    #[test]
    fn backoff_caps_at_max() {
        let err = TaskError::transient("X", "y");
        assert_eq!(compute_backoff(&err, 30), Duration::from_millis(60_000));
    }

    #[test]
    fn retry_after_hint_wins() {
        let err = TaskError::transient("X", "y").with_retry_after_ms(250);
        assert_eq!(compute_backoff(&err, 5), Duration::from_millis(250));
    }

    #[test]
    fn fast_class_uses_fast_base() {
        let err = TaskError::validation("X", "y");
        assert_eq!(compute_backoff(&err, 1), Duration::from_millis(100));
    }
}
