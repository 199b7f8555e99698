//! Finding reconciliation: the idempotent merge of raw detections into the
//! durable finding set, plus the store boundary it is persisted through.

pub mod error;
pub mod reconciler;
pub mod store;

pub use error::StoreError;
pub use reconciler::{reconcile, CoveredSources, ReconcileOutcome};
pub use store::{FindingStore, MemoryFindingStore};
