//! Orchestrator error types.

use thiserror::Error;

use patrol_reconcile::StoreError;

#[derive(Debug, Error)]
pub enum ScanError {
    /// Caller error, rejected synchronously — no job is created.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
