//! Scan orchestration: the job state machine, bounded fan-out over
//! collection sources, and per-scope reconciliation.

pub mod error;
pub mod job;
pub mod orchestrator;
mod run;

pub use error::ScanError;
pub use job::JobHandle;
pub use orchestrator::{Orchestrator, ScanOptions};
