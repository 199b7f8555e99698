//! Scan job state machine types.
//!
//! A [`ScanJob`] is owned exclusively by the orchestrator for its lifetime;
//! callers only ever see immutable snapshots. The status transitions exactly
//! once into a terminal state and the job is immutable afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{FindingDelta, Scope};

/// Lifecycle status of a scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    /// At least one source succeeded, at least one failed beyond retries.
    Partial,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Partial => write!(f, "partial"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Immutable snapshot of a scan job, as returned by `get_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub job_id: Uuid,
    pub scope: Scope,
    /// Rule ids requested at submission.
    pub requested_rules: Vec<String>,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Aggregated per-source failures and evaluation degradations.
    pub error_summary: Option<String>,
    pub delta: FindingDelta,
}
