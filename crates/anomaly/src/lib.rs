//! Log-derived anomaly detection: sliding-window frequency comparison
//! against an injected, read-only baseline.

pub mod baseline;
pub mod engine;

pub use baseline::{BaselineProvider, TableBaseline};
pub use engine::{severity_for_score, AnomalyEngine};
