//! Collector error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    /// Retryable: throttling, connection resets, provider hiccups.
    #[error("transient collector error: {0}")]
    Transient(String),

    /// Not retryable: missing permissions, unknown resource type.
    #[error("permanent collector error: {0}")]
    Permanent(String),

    /// Per-call deadline exceeded — treated as transient for retry purposes.
    #[error("collector call exceeded deadline after {0}ms")]
    DeadlineExceeded(u64),

    /// Cooperative cancellation observed between attempts.
    #[error("collector call cancelled")]
    Cancelled,
}

impl CollectorError {
    /// Whether the retry loop should attempt the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollectorError::Transient(_) | CollectorError::DeadlineExceeded(_)
        )
    }
}
