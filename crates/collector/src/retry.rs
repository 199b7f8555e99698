//! Deadline + exponential backoff wrapper around collector calls.
//!
//! Every collector call carries a per-call deadline; exceeding it counts as a
//! transient failure and is retried with exponential backoff up to the
//! configured attempt cap. Permanent failures stop immediately. Cancellation
//! is observed between attempts, never mid-call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::timeout;
use tracing::warn;

use patrol_core::config::CollectorConfig;
use patrol_core::{LogEvent, ResourceSnapshot, Scope, TimeWindow};

use crate::error::CollectorError;
use crate::source::{LogCollector, ResourceCollector};

/// Cooperative cancellation signal, checked at retry and iteration
/// checkpoints. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Fetch resource snapshots with deadline, retry and cancellation handling.
pub async fn fetch_resources_with_retry(
    collector: &dyn ResourceCollector,
    scope: &Scope,
    resource_type: &str,
    config: &CollectorConfig,
    cancel: &CancelFlag,
) -> Result<Vec<ResourceSnapshot>, CollectorError> {
    retry_loop(config, cancel, resource_type, || async {
        match timeout(config.deadline(), collector.fetch(scope, resource_type)).await {
            Ok(result) => result,
            Err(_) => Err(CollectorError::DeadlineExceeded(
                config.deadline().as_millis() as u64,
            )),
        }
    })
    .await
}

/// Fetch log events with deadline, retry and cancellation handling.
pub async fn fetch_logs_with_retry(
    collector: &dyn LogCollector,
    scope: &Scope,
    source: &str,
    window: TimeWindow,
    config: &CollectorConfig,
    cancel: &CancelFlag,
) -> Result<Vec<LogEvent>, CollectorError> {
    retry_loop(config, cancel, source, || async {
        match timeout(config.deadline(), collector.fetch(scope, source, window)).await {
            Ok(result) => result,
            Err(_) => Err(CollectorError::DeadlineExceeded(
                config.deadline().as_millis() as u64,
            )),
        }
    })
    .await
}

/// Shared retry loop: `max_attempts` tries, backoff base × 2^attempt between
/// them, cancellation checked before each attempt.
async fn retry_loop<T, F, Fut>(
    config: &CollectorConfig,
    cancel: &CancelFlag,
    source: &str,
    mut call: F,
) -> Result<T, CollectorError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, CollectorError>>,
{
    let mut last_err = CollectorError::Transient("no attempts made".to_string());

    for attempt in 0..config.max_attempts.max(1) {
        if cancel.is_cancelled() {
            return Err(CollectorError::Cancelled);
        }

        if attempt > 0 {
            tokio::time::sleep(config.backoff(attempt - 1)).await;
        }

        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                warn!(
                    source = %source,
                    attempt = attempt + 1,
                    max_attempts = config.max_attempts,
                    error = %e,
                    "collector call failed, will retry"
                );
                last_err = e;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err)
}
