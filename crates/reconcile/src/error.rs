//! Finding store error types.

use thiserror::Error;

/// Store failures are fatal to the reconciliation step: the job fails and
/// the pre-scan finding set is preserved untouched.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("finding store unavailable: {0}")]
    Unavailable(String),

    #[error("finding store read failed: {0}")]
    Read(String),

    #[error("finding store write failed: {0}")]
    Write(String),
}
