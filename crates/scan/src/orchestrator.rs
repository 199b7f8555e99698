//! The orchestrator's public surface: submit, status, cancel, list.
//!
//! `submit_scan` validates synchronously, registers a QUEUED job, and spawns
//! the execution as a fire-and-forget background task — the job id returns
//! immediately. A shared semaphore bounds concurrent collector calls across
//! every running scan, which is how the external provider rate limit is
//! respected. Reconciliation is serialized per scope through a lazily created
//! per-scope async mutex; scans of different scopes never contend on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::info;
use uuid::Uuid;

use patrol_anomaly::{AnomalyEngine, BaselineProvider};
use patrol_collector::{LogCollector, ResourceCollector};
use patrol_core::{Finding, FindingFilter, PatrolConfig, ScanJob, Scope};
use patrol_reconcile::FindingStore;
use patrol_rules::{ComplianceRule, RuleCatalog};

use crate::error::ScanError;
use crate::job::JobHandle;
use crate::run;

/// Per-submission scan parameters.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Resource types to collect, e.g. `["s3_bucket", "security_group"]`.
    pub resource_types: Vec<String>,
    /// Log sources to collect, e.g. `["cloudtrail"]`.
    pub log_sources: Vec<String>,
    /// Anomaly window end; defaults to scan execution time.
    pub window_end: Option<DateTime<Utc>>,
}

/// Everything a running scan needs, shared with spawned tasks.
pub(crate) struct ScanContext {
    pub(crate) config: PatrolConfig,
    pub(crate) resources: Arc<dyn ResourceCollector>,
    pub(crate) logs: Arc<dyn LogCollector>,
    pub(crate) store: Arc<dyn FindingStore>,
    pub(crate) baseline: Arc<dyn BaselineProvider>,
    pub(crate) anomaly_engine: AnomalyEngine,
    /// Bounds concurrent collector calls across all running scans.
    pub(crate) collector_permits: Arc<Semaphore>,
    /// One reconciliation lock per scope, created on first use.
    scope_locks: StdMutex<HashMap<Scope, Arc<AsyncMutex<()>>>>,
}

impl ScanContext {
    /// The reconciliation lock for a scope, created on first use.
    pub(crate) fn scope_lock(&self, scope: &Scope) -> Arc<AsyncMutex<()>> {
        let mut locks = self.scope_locks.lock().unwrap();
        locks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop scope locks no running scan holds a handle to. A lock is in use
    /// whenever some task still owns a clone of its `Arc`.
    fn prune_idle_locks(&self) {
        let mut locks = self.scope_locks.lock().unwrap();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

pub struct Orchestrator {
    ctx: Arc<ScanContext>,
    catalog: Arc<RuleCatalog>,
    jobs: RwLock<HashMap<Uuid, Arc<JobHandle>>>,
}

impl Orchestrator {
    pub fn new(
        config: PatrolConfig,
        catalog: Arc<RuleCatalog>,
        resources: Arc<dyn ResourceCollector>,
        logs: Arc<dyn LogCollector>,
        store: Arc<dyn FindingStore>,
        baseline: Arc<dyn BaselineProvider>,
    ) -> Self {
        let permits = config.scan.max_concurrent_collectors.max(1);
        let anomaly_engine = AnomalyEngine::new(config.anomaly.clone());
        Self {
            ctx: Arc::new(ScanContext {
                config,
                resources,
                logs,
                store,
                baseline,
                anomaly_engine,
                collector_permits: Arc::new(Semaphore::new(permits)),
                scope_locks: StdMutex::new(HashMap::new()),
            }),
            catalog,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Validate and enqueue a scan. Returns the job id immediately; the work
    /// runs in a background task.
    pub fn submit_scan(
        &self,
        scope: &str,
        rule_ids: Vec<String>,
        options: ScanOptions,
    ) -> Result<Uuid, ScanError> {
        let scope = Scope::new(scope)
            .ok_or_else(|| ScanError::InvalidRequest("scope must be non-empty".to_string()))?;

        let mut rules: Vec<ComplianceRule> = Vec::with_capacity(rule_ids.len());
        for id in &rule_ids {
            let rule = self
                .catalog
                .get(id)
                .ok_or_else(|| ScanError::InvalidRequest(format!("unknown rule id '{}'", id)))?;
            rules.push(rule.clone());
        }

        if options.resource_types.is_empty() && options.log_sources.is_empty() {
            return Err(ScanError::InvalidRequest(
                "at least one resource type or log source is required".to_string(),
            ));
        }

        self.prune_finished(Utc::now());

        let job = Arc::new(JobHandle::new(scope, rule_ids));
        let job_id = job.job_id;
        self.jobs.write().unwrap().insert(job_id, job.clone());

        info!(
            job_id = %job_id,
            scope = %job.scope,
            resource_types = options.resource_types.len(),
            log_sources = options.log_sources.len(),
            rules = rules.len(),
            "scan job queued"
        );

        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            run::run_scan(ctx, job, rules, options).await;
        });

        Ok(job_id)
    }

    /// Drop terminal jobs older than the retention window, then any scope
    /// locks left idle. Runs on every submission so the job table and lock
    /// map stay bounded without a background sweeper.
    fn prune_finished(&self, now: DateTime<Utc>) {
        let retention = chrono::Duration::seconds(self.ctx.config.scan.job_retention_secs as i64);
        let mut jobs = self.jobs.write().unwrap();
        let before = jobs.len();
        jobs.retain(|_, job| {
            let snap = job.snapshot();
            match snap.finished_at {
                Some(finished_at) if snap.status.is_terminal() => finished_at + retention > now,
                _ => true,
            }
        });
        let dropped = before - jobs.len();
        drop(jobs);
        if dropped > 0 {
            info!(dropped, "pruned finished scan jobs");
        }
        self.ctx.prune_idle_locks();
    }

    /// Immutable snapshot of a job, or `None` for an unknown id.
    pub fn get_status(&self, job_id: Uuid) -> Option<ScanJob> {
        self.jobs
            .read()
            .unwrap()
            .get(&job_id)
            .map(|job| job.snapshot())
    }

    /// Request cooperative cancellation. Returns true if the job existed and
    /// had not yet reached a terminal state.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        let job = match self.jobs.read().unwrap().get(&job_id) {
            Some(job) => job.clone(),
            None => return false,
        };
        let accepted = job.request_cancel();
        if accepted {
            info!(job_id = %job_id, "scan cancellation requested");
        }
        accepted
    }

    /// Current findings for a scope, filtered and ranked by severity
    /// (highest first, finding id as tie-break).
    pub async fn list_findings(
        &self,
        scope: &Scope,
        filter: &FindingFilter,
    ) -> Result<Vec<Finding>, ScanError> {
        let mut findings: Vec<Finding> = self
            .ctx
            .store
            .load_prior(scope)
            .await?
            .into_iter()
            .filter(|f| filter.matches(f))
            .collect();
        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.finding_id.cmp(&b.finding_id))
        });
        Ok(findings)
    }
}
