//! Scan execution: bounded fan-out per source, aggregation, and the single
//! reconciliation pass.
//!
//! Each collection source (resource type or log source) runs as its own task
//! behind a shared semaphore permit. A source that fails past its retry
//! budget is isolated — siblings keep going. Cancellation is cooperative:
//! tasks observe the flag at per-source and per-resource checkpoints and
//! unwind without contributing raw findings, so a cancelled source is simply
//! never covered by the reconciliation pass.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{error, info, warn};

use patrol_collector::{
    fetch_logs_with_retry, fetch_resources_with_retry, CollectorError, SourceId,
};
use patrol_core::{FindingDelta, JobStatus, RawFinding, TimeWindow};
use patrol_reconcile::{reconcile, CoveredSources};
use patrol_rules::{ComplianceRule, RuleEngine};

use crate::job::JobHandle;
use crate::orchestrator::{ScanContext, ScanOptions};

/// Result of collecting and evaluating one source.
enum SourceOutcome {
    Succeeded {
        source: SourceId,
        raw: Vec<RawFinding>,
        degraded: usize,
    },
    Failed {
        source: SourceId,
        error: String,
    },
    Cancelled {
        source: SourceId,
    },
}

/// Execute a scan job end to end — called inside tokio::spawn.
pub(crate) async fn run_scan(
    ctx: Arc<ScanContext>,
    job: Arc<JobHandle>,
    rules: Vec<ComplianceRule>,
    options: ScanOptions,
) {
    job.mark_running();

    let now = Utc::now();
    let window_end = options.window_end.unwrap_or(now);

    // Fan out one task per source; the shared semaphore caps concurrent
    // collector calls across every running scan.
    let rules = Arc::new(rules);
    let mut handles = Vec::new();
    for resource_type in &options.resource_types {
        handles.push(tokio::spawn(collect_resource_source(
            Arc::clone(&ctx),
            Arc::clone(&job),
            Arc::clone(&rules),
            resource_type.clone(),
            now,
        )));
    }
    for source in &options.log_sources {
        handles.push(tokio::spawn(collect_log_source(
            Arc::clone(&ctx),
            Arc::clone(&job),
            source.clone(),
            window_end,
            now,
        )));
    }

    let mut covered = CoveredSources::new();
    let mut raw: Vec<RawFinding> = Vec::new();
    let mut failures: Vec<String> = Vec::new();
    let mut degraded_total = 0usize;

    for joined in join_all(handles).await {
        match joined {
            Ok(SourceOutcome::Succeeded { source, raw: mut source_raw, degraded }) => {
                covered.add(source.name());
                raw.append(&mut source_raw);
                degraded_total += degraded;
            }
            Ok(SourceOutcome::Failed { source, error }) => {
                failures.push(format!("{}: {}", source, error));
            }
            Ok(SourceOutcome::Cancelled { source }) => {
                info!(job_id = %job.job_id, source = %source, "source unwound on cancellation");
            }
            Err(join_err) => {
                failures.push(format!("source task panicked: {}", join_err));
            }
        }
    }

    let cancelled = job.cancel.is_cancelled();
    let summary = build_summary(&failures, degraded_total);

    // Every source failed and nothing was cancelled: nothing to reconcile.
    if covered.is_empty() {
        let terminal = if cancelled {
            JobStatus::Cancelled
        } else {
            JobStatus::Failed
        };
        job.finish(terminal, summary, FindingDelta::default());
        return;
    }

    // Exactly one reconciliation pass per scan, serialized per scope.
    // Already-completed sources are reconciled even when the job was
    // cancelled mid-flight — their findings are retained.
    let lock = ctx.scope_lock(&job.scope);
    let _guard = lock.lock().await;

    let prior = match ctx.store.load_prior(&job.scope).await {
        Ok(prior) => prior,
        Err(e) => {
            error!(job_id = %job.job_id, scope = %job.scope, error = %e, "prior findings load failed");
            job.finish(
                JobStatus::Failed,
                Some(merge_summary(summary, format!("store: {}", e))),
                FindingDelta::default(),
            );
            return;
        }
    };

    let outcome = reconcile(&job.scope, &raw, &prior, &covered, now);

    if let Err(e) = ctx.store.save(&job.scope, outcome.findings).await {
        // Fatal: the pre-scan finding set is preserved, no partial write.
        error!(job_id = %job.job_id, scope = %job.scope, error = %e, "findings save failed");
        job.finish(
            JobStatus::Failed,
            Some(merge_summary(summary, format!("store: {}", e))),
            FindingDelta::default(),
        );
        return;
    }

    let terminal = if cancelled {
        JobStatus::Cancelled
    } else if failures.is_empty() {
        JobStatus::Completed
    } else {
        JobStatus::Partial
    };
    job.finish(terminal, summary, outcome.delta);
}

/// Collect one resource type and run the rule engine over its snapshots.
async fn collect_resource_source(
    ctx: Arc<ScanContext>,
    job: Arc<JobHandle>,
    rules: Arc<Vec<ComplianceRule>>,
    resource_type: String,
    detected_at: DateTime<Utc>,
) -> SourceOutcome {
    let source = SourceId::Resource(resource_type.clone());
    let _permit = match ctx.collector_permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return SourceOutcome::Failed {
                source,
                error: "collector limiter closed".to_string(),
            }
        }
    };

    let snapshots = match fetch_resources_with_retry(
        ctx.resources.as_ref(),
        &job.scope,
        &resource_type,
        &ctx.config.collector,
        &job.cancel,
    )
    .await
    {
        Ok(snapshots) => snapshots,
        Err(CollectorError::Cancelled) => return SourceOutcome::Cancelled { source },
        Err(e) => {
            warn!(job_id = %job.job_id, source = %source, error = %e, "source collection failed");
            return SourceOutcome::Failed { source, error: e.to_string() };
        }
    };

    let rule_refs: Vec<&ComplianceRule> = rules.iter().collect();
    let mut raw = Vec::new();
    let mut degraded = 0usize;
    for snapshot in &snapshots {
        // Cancellation checkpoint at the per-resource boundary: the whole
        // source unwinds, contributing nothing to reconciliation.
        if job.cancel.is_cancelled() {
            return SourceOutcome::Cancelled { source };
        }
        let outcome = RuleEngine::evaluate(snapshot, &rule_refs, detected_at);
        degraded += outcome.degraded.len();
        raw.extend(outcome.violations.into_iter().map(RawFinding::Compliance));
    }

    SourceOutcome::Succeeded { source, raw, degraded }
}

/// Collect one log source and run the anomaly engine over its events.
async fn collect_log_source(
    ctx: Arc<ScanContext>,
    job: Arc<JobHandle>,
    log_source: String,
    window_end: DateTime<Utc>,
    detected_at: DateTime<Utc>,
) -> SourceOutcome {
    let source = SourceId::Log(log_source.clone());
    let _permit = match ctx.collector_permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return SourceOutcome::Failed {
                source,
                error: "collector limiter closed".to_string(),
            }
        }
    };

    // Fetch slightly past the window start so late events inside the
    // tolerance are available to the engine.
    let anomaly = &ctx.config.anomaly;
    let fetch_start = window_end
        - chrono::Duration::seconds((anomaly.window_secs + anomaly.lateness_tolerance_secs) as i64);
    let window = TimeWindow::new(fetch_start, window_end);

    let events = match fetch_logs_with_retry(
        ctx.logs.as_ref(),
        &job.scope,
        &log_source,
        window,
        &ctx.config.collector,
        &job.cancel,
    )
    .await
    {
        Ok(events) => events,
        Err(CollectorError::Cancelled) => return SourceOutcome::Cancelled { source },
        Err(e) => {
            warn!(job_id = %job.job_id, source = %source, error = %e, "source collection failed");
            return SourceOutcome::Failed { source, error: e.to_string() };
        }
    };

    // Checkpoint between collection and evaluation.
    if job.cancel.is_cancelled() {
        return SourceOutcome::Cancelled { source };
    }

    let records = ctx.anomaly_engine.evaluate(
        &events,
        ctx.baseline.as_ref(),
        window_end,
        detected_at,
    );
    let raw = records.into_iter().map(RawFinding::Anomaly).collect();

    SourceOutcome::Succeeded { source, raw, degraded: 0 }
}

fn build_summary(failures: &[String], degraded: usize) -> Option<String> {
    let mut parts: Vec<String> = failures.to_vec();
    if degraded > 0 {
        parts.push(format!("{} rule evaluations degraded", degraded));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn merge_summary(existing: Option<String>, addition: String) -> String {
    match existing {
        Some(s) => format!("{}; {}", s, addition),
        None => addition,
    }
}
