pub mod config;
pub mod finding;
pub mod job;
pub mod resource;

pub use config::PatrolConfig;
pub use finding::*;
pub use job::*;
pub use resource::*;

use serde::{Deserialize, Serialize};

/// Severity ranking shared by compliance rules and anomaly mapping.
/// Ordering is derived, so `Severity::High > Severity::Medium` holds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// What kind of detector produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Compliance,
    Anomaly,
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingKind::Compliance => write!(f, "compliance"),
            FindingKind::Anomaly => write!(f, "anomaly"),
        }
    }
}
