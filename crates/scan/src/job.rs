//! In-memory job handle.
//!
//! The orchestrator owns a [`JobHandle`] per scan; callers only ever receive
//! [`ScanJob`] snapshots. The terminal transition happens exactly once — a
//! late writer (e.g. a cancel racing a natural completion) loses and the
//! first terminal state sticks.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use patrol_collector::CancelFlag;
use patrol_core::{FindingDelta, JobStatus, ScanJob, Scope};

pub struct JobHandle {
    pub job_id: Uuid,
    pub scope: Scope,
    pub requested_rules: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub cancel: CancelFlag,
    status: RwLock<JobStatus>,
    finished_at: RwLock<Option<DateTime<Utc>>>,
    error_summary: RwLock<Option<String>>,
    delta: RwLock<FindingDelta>,
}

impl JobHandle {
    pub fn new(scope: Scope, requested_rules: Vec<String>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            scope,
            requested_rules,
            started_at: Utc::now(),
            cancel: CancelFlag::new(),
            status: RwLock::new(JobStatus::Queued),
            finished_at: RwLock::new(None),
            error_summary: RwLock::new(None),
            delta: RwLock::new(FindingDelta::default()),
        }
    }

    pub fn status(&self) -> JobStatus {
        *self.status.read().unwrap()
    }

    /// QUEUED → RUNNING. No-op if the job already reached a terminal state
    /// (a cancel can land before execution starts).
    pub fn mark_running(&self) {
        let mut status = self.status.write().unwrap();
        if *status == JobStatus::Queued {
            *status = JobStatus::Running;
        }
    }

    /// Transition into a terminal state. Returns false if some other path
    /// already finished the job; the first terminal state wins.
    pub fn finish(
        &self,
        terminal: JobStatus,
        error_summary: Option<String>,
        delta: FindingDelta,
    ) -> bool {
        debug_assert!(terminal.is_terminal());
        let mut status = self.status.write().unwrap();
        if status.is_terminal() {
            return false;
        }
        *status = terminal;
        *self.finished_at.write().unwrap() = Some(Utc::now());
        *self.error_summary.write().unwrap() = error_summary;
        *self.delta.write().unwrap() = delta;
        info!(
            job_id = %self.job_id,
            scope = %self.scope,
            status = %terminal,
            "scan job finished"
        );
        true
    }

    /// Request cooperative cancellation. Returns true if the job had not yet
    /// reached a terminal state.
    pub fn request_cancel(&self) -> bool {
        if self.status().is_terminal() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    /// Immutable snapshot for callers.
    ///
    /// The status guard is held across the whole read so a concurrent
    /// `finish` (which writes every field under its status write guard)
    /// cannot produce a half-finished view, e.g. RUNNING with a
    /// `finished_at` already set.
    pub fn snapshot(&self) -> ScanJob {
        let status = self.status.read().unwrap();
        ScanJob {
            job_id: self.job_id,
            scope: self.scope.clone(),
            requested_rules: self.requested_rules.clone(),
            status: *status,
            started_at: self.started_at,
            finished_at: *self.finished_at.read().unwrap(),
            error_summary: self.error_summary.read().unwrap().clone(),
            delta: *self.delta.read().unwrap(),
        }
    }
}
