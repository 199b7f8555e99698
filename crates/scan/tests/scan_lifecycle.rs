//! End-to-end scan tests over in-memory collectors and store.
//!
//! Each scenario drives the orchestrator through submit / poll / list and
//! asserts the finding lifecycle, the job terminal state and the delta. The
//! store is the continuity between scans; collectors are rebuilt per phase
//! to change what the "provider" returns.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use patrol_anomaly::TableBaseline;
use patrol_collector::{
    CollectorError, ResourceCollector, StaticLogCollector, StaticResourceCollector,
};
use patrol_core::{
    FindingFilter, FindingKind, FindingStatus, JobStatus, LogEvent, PatrolConfig,
    ResourceSnapshot, ScanJob, Scope, Severity,
};
use patrol_reconcile::MemoryFindingStore;
use patrol_rules::{CheckExpr, ComplianceRule, RuleCatalog};
use patrol_scan::{Orchestrator, ScanError, ScanOptions};

const SCOPE: &str = "acct-1/us-east-1";

const CATALOG_YAML: &str = r#"
apiVersion: patrol/v1
kind: ComplianceRule
metadata:
  id: S3-PUBLIC-READ
  name: S3 buckets must not allow public read
spec:
  resource_type: s3_bucket
  severity: high
  check:
    eq: { path: acl.public_read, value: false }
---
apiVersion: patrol/v1
kind: ComplianceRule
metadata:
  id: IAM-NO-WILDCARD
  name: IAM roles must not carry wildcard policies
spec:
  resource_type: iam_role
  severity: critical
  check:
    absent: { path: policy.wildcard_action }
---
apiVersion: patrol/v1
kind: ComplianceRule
metadata:
  id: SG-NO-OPEN-INGRESS
  name: Security groups must not allow 0.0.0.0/0 ingress
spec:
  resource_type: security_group
  severity: high
  check:
    eq: { path: ingress.open_to_world, value: false }
"#;

fn scope() -> Scope {
    Scope::new(SCOPE).unwrap()
}

fn catalog() -> Arc<RuleCatalog> {
    Arc::new(RuleCatalog::from_yaml_str(CATALOG_YAML).unwrap())
}

/// Fast retries so scripted transient failures don't slow the suite down.
fn test_config() -> PatrolConfig {
    let mut config = PatrolConfig::default();
    config.collector.backoff_base_ms = 1;
    config.collector.deadline_secs = 5;
    config
}

fn snapshot(resource_type: &str, resource_id: &str, configuration: serde_json::Value) -> ResourceSnapshot {
    let configuration = match configuration {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    };
    ResourceSnapshot {
        resource_id: resource_id.to_string(),
        resource_type: resource_type.to_string(),
        scope: scope(),
        configuration,
        captured_at: Utc::now(),
    }
}

fn bucket(id: &str, public_read: bool) -> ResourceSnapshot {
    snapshot("s3_bucket", id, json!({ "acl": { "public_read": public_read } }))
}

fn login_event(id: &str, minutes_ago: i64) -> LogEvent {
    let mut attributes = BTreeMap::new();
    attributes.insert("event_type".to_string(), json!("ConsoleLogin"));
    LogEvent {
        event_id: id.to_string(),
        source: "cloudtrail".to_string(),
        scope: scope(),
        timestamp: Utc::now() - chrono::Duration::minutes(minutes_ago),
        attributes,
    }
}

fn build(
    resources: StaticResourceCollector,
    logs: StaticLogCollector,
    store: Arc<MemoryFindingStore>,
    baseline: TableBaseline,
) -> Orchestrator {
    Orchestrator::new(
        test_config(),
        catalog(),
        Arc::new(resources),
        Arc::new(logs),
        store,
        Arc::new(baseline),
    )
}

async fn await_terminal(orchestrator: &Orchestrator, job_id: Uuid) -> ScanJob {
    loop {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let job = orchestrator
            .get_status(job_id)
            .expect("job vanished from registry");
        if job.status.is_terminal() {
            return job;
        }
    }
}

fn resource_scan(types: &[&str]) -> ScanOptions {
    ScanOptions {
        resource_types: types.iter().map(|t| t.to_string()).collect(),
        log_sources: Vec::new(),
        window_end: None,
    }
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn finding_lifecycle_new_active_resolved_aged_out() {
    let store = Arc::new(MemoryFindingStore::new());
    let rules = vec!["S3-PUBLIC-READ".to_string()];

    // Scan 1: violation appears as NEW.
    let orchestrator = build(
        StaticResourceCollector::new().with_snapshots("s3_bucket", vec![bucket("bucket-42", true)]),
        StaticLogCollector::new(),
        store.clone(),
        TableBaseline::new(),
    );
    let job_id = orchestrator
        .submit_scan(SCOPE, rules.clone(), resource_scan(&["s3_bucket"]))
        .unwrap();
    let job = await_terminal(&orchestrator, job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!((job.delta.new, job.delta.resolved, job.delta.still_active), (1, 0, 0));

    let findings = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].status, FindingStatus::New);
    assert_eq!(findings[0].key.detector, "S3-PUBLIC-READ");
    assert_eq!(findings[0].severity, Severity::High);

    // Scan 2: still violating — NEW becomes ACTIVE.
    let orchestrator = build(
        StaticResourceCollector::new().with_snapshots("s3_bucket", vec![bucket("bucket-42", true)]),
        StaticLogCollector::new(),
        store.clone(),
        TableBaseline::new(),
    );
    let job_id = orchestrator
        .submit_scan(SCOPE, rules.clone(), resource_scan(&["s3_bucket"]))
        .unwrap();
    let job = await_terminal(&orchestrator, job_id).await;
    assert_eq!((job.delta.new, job.delta.resolved, job.delta.still_active), (0, 0, 1));
    let findings = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    assert_eq!(findings[0].status, FindingStatus::Active);
    assert!(findings[0].last_seen_at > findings[0].first_seen_at);

    // Scan 3: remediated — finding is RESOLVED.
    let orchestrator = build(
        StaticResourceCollector::new().with_snapshots("s3_bucket", vec![bucket("bucket-42", false)]),
        StaticLogCollector::new(),
        store.clone(),
        TableBaseline::new(),
    );
    let job_id = orchestrator
        .submit_scan(SCOPE, rules.clone(), resource_scan(&["s3_bucket"]))
        .unwrap();
    let job = await_terminal(&orchestrator, job_id).await;
    assert_eq!((job.delta.new, job.delta.resolved, job.delta.still_active), (0, 1, 0));
    let findings = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].status, FindingStatus::Resolved);
    assert!(findings[0].resolved_at.is_some());

    // Scan 4: the RESOLVED record ages out after one clean cycle.
    let orchestrator = build(
        StaticResourceCollector::new().with_snapshots("s3_bucket", vec![bucket("bucket-42", false)]),
        StaticLogCollector::new(),
        store.clone(),
        TableBaseline::new(),
    );
    let job_id = orchestrator
        .submit_scan(SCOPE, rules.clone(), resource_scan(&["s3_bucket"]))
        .unwrap();
    await_terminal(&orchestrator, job_id).await;
    let findings = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    assert!(findings.is_empty());
}

// ── Retries and partial scans ───────────────────────────────────────

#[tokio::test]
async fn transient_failures_are_retried_to_completion() {
    let store = Arc::new(MemoryFindingStore::new());
    let resources = StaticResourceCollector::new()
        .with_snapshots("s3_bucket", vec![bucket("bucket-42", true)])
        .fail_transient("s3_bucket", 2);
    let orchestrator = build(resources, StaticLogCollector::new(), store, TableBaseline::new());

    let job_id = orchestrator
        .submit_scan(SCOPE, vec!["S3-PUBLIC-READ".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap();
    let job = await_terminal(&orchestrator, job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.error_summary.is_none());
    let findings = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    assert_eq!(findings.len(), 1);
}

#[tokio::test]
async fn partial_scan_keeps_findings_of_uncovered_sources() {
    let store = Arc::new(MemoryFindingStore::new());
    let rules = vec!["S3-PUBLIC-READ".to_string(), "SG-NO-OPEN-INGRESS".to_string()];
    let sg = snapshot("security_group", "sg-7", json!({ "ingress": { "open_to_world": true } }));

    // Scan 1: both sources healthy, two findings.
    let orchestrator = build(
        StaticResourceCollector::new()
            .with_snapshots("s3_bucket", vec![bucket("bucket-42", true)])
            .with_snapshots("security_group", vec![sg.clone()]),
        StaticLogCollector::new(),
        store.clone(),
        TableBaseline::new(),
    );
    let job_id = orchestrator
        .submit_scan(SCOPE, rules.clone(), resource_scan(&["s3_bucket", "security_group"]))
        .unwrap();
    let job = await_terminal(&orchestrator, job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.delta.new, 2);

    // Scan 2: security_group fails past retries. The job is PARTIAL, the
    // summary names the failed source, and its finding carries over
    // untouched instead of being wrongly resolved.
    let orchestrator = build(
        StaticResourceCollector::new()
            .with_snapshots("s3_bucket", vec![bucket("bucket-42", true)])
            .fail_permanent("security_group"),
        StaticLogCollector::new(),
        store.clone(),
        TableBaseline::new(),
    );
    let job_id = orchestrator
        .submit_scan(SCOPE, rules, resource_scan(&["s3_bucket", "security_group"]))
        .unwrap();
    let job = await_terminal(&orchestrator, job_id).await;
    assert_eq!(job.status, JobStatus::Partial);
    let summary = job.error_summary.unwrap();
    assert!(summary.contains("security_group"));

    let findings = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    assert_eq!(findings.len(), 2);
    let by_detector: HashMap<&str, FindingStatus> = findings
        .iter()
        .map(|f| (f.key.detector.as_str(), f.status))
        .collect();
    assert_eq!(by_detector["S3-PUBLIC-READ"], FindingStatus::Active);
    assert_eq!(by_detector["SG-NO-OPEN-INGRESS"], FindingStatus::New);
}

#[tokio::test]
async fn all_sources_failing_fails_the_job() {
    let store = Arc::new(MemoryFindingStore::new());
    let orchestrator = build(
        StaticResourceCollector::new().fail_permanent("s3_bucket"),
        StaticLogCollector::new(),
        store,
        TableBaseline::new(),
    );
    let job_id = orchestrator
        .submit_scan(SCOPE, vec!["S3-PUBLIC-READ".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap();
    let job = await_terminal(&orchestrator, job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_summary.unwrap().contains("s3_bucket"));
}

// ── Cancellation ────────────────────────────────────────────────────

/// Resource collector whose listed types block on a gate before returning.
/// Completed fetches are counted so tests can sequence against them.
struct GatedResourceCollector {
    inner: StaticResourceCollector,
    gate: watch::Receiver<bool>,
    gated_types: Vec<String>,
    completed: Arc<AtomicUsize>,
}

#[async_trait]
impl ResourceCollector for GatedResourceCollector {
    async fn fetch(
        &self,
        scope: &Scope,
        resource_type: &str,
    ) -> Result<Vec<ResourceSnapshot>, CollectorError> {
        if self.gated_types.iter().any(|t| t == resource_type) {
            let mut gate = self.gate.clone();
            gate.wait_for(|open| *open)
                .await
                .map_err(|_| CollectorError::Transient("gate dropped".to_string()))?;
        }
        let result = self.inner.fetch(scope, resource_type).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

#[tokio::test]
async fn cancellation_keeps_completed_sources_and_skips_blocked_ones() {
    let store = Arc::new(MemoryFindingStore::new());
    let (gate_tx, gate_rx) = watch::channel(false);
    let completed = Arc::new(AtomicUsize::new(0));

    let iam = snapshot("iam_role", "role-9", json!({ "policy": { "wildcard_action": "*" } }));
    let sg = snapshot("security_group", "sg-7", json!({ "ingress": { "open_to_world": true } }));
    let resources = GatedResourceCollector {
        inner: StaticResourceCollector::new()
            .with_snapshots("s3_bucket", vec![bucket("bucket-42", true)])
            .with_snapshots("iam_role", vec![iam])
            .with_snapshots("security_group", vec![sg]),
        gate: gate_rx,
        gated_types: vec!["security_group".to_string()],
        completed: completed.clone(),
    };

    let orchestrator = Orchestrator::new(
        test_config(),
        catalog(),
        Arc::new(resources),
        Arc::new(StaticLogCollector::new()),
        store,
        Arc::new(TableBaseline::new()),
    );
    let job_id = orchestrator
        .submit_scan(
            SCOPE,
            vec![
                "S3-PUBLIC-READ".to_string(),
                "IAM-NO-WILDCARD".to_string(),
                "SG-NO-OPEN-INGRESS".to_string(),
            ],
            resource_scan(&["s3_bucket", "iam_role", "security_group"]),
        )
        .unwrap();

    // Let the two ungated sources finish, then cancel while the gated one
    // is still blocked in its fetch.
    while completed.load(Ordering::SeqCst) < 2 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(orchestrator.cancel(job_id));
    gate_tx.send(true).unwrap();

    let job = await_terminal(&orchestrator, job_id).await;
    assert_eq!(job.status, JobStatus::Cancelled);

    // Findings from the sources that completed before cancellation are
    // reconciled and retained; the blocked source contributed nothing.
    let findings = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    let detectors: Vec<&str> = findings.iter().map(|f| f.key.detector.as_str()).collect();
    assert_eq!(detectors.len(), 2);
    assert!(detectors.contains(&"S3-PUBLIC-READ"));
    assert!(detectors.contains(&"IAM-NO-WILDCARD"));
}

#[tokio::test]
async fn cancel_of_finished_or_unknown_job_is_rejected() {
    let store = Arc::new(MemoryFindingStore::new());
    let orchestrator = build(
        StaticResourceCollector::new().with_snapshots("s3_bucket", vec![bucket("bucket-42", true)]),
        StaticLogCollector::new(),
        store,
        TableBaseline::new(),
    );
    let job_id = orchestrator
        .submit_scan(SCOPE, vec!["S3-PUBLIC-READ".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap();
    await_terminal(&orchestrator, job_id).await;

    assert!(!orchestrator.cancel(job_id));
    assert!(!orchestrator.cancel(Uuid::new_v4()));
}

// ── Validation ──────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_submissions_are_rejected_synchronously() {
    let store = Arc::new(MemoryFindingStore::new());
    let orchestrator = build(
        StaticResourceCollector::new(),
        StaticLogCollector::new(),
        store,
        TableBaseline::new(),
    );

    let err = orchestrator
        .submit_scan("", vec!["S3-PUBLIC-READ".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap_err();
    assert!(matches!(err, ScanError::InvalidRequest(_)));

    let err = orchestrator
        .submit_scan(SCOPE, vec!["NO-SUCH-RULE".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap_err();
    assert!(matches!(err, ScanError::InvalidRequest(_)));
    assert!(err.to_string().contains("NO-SUCH-RULE"));

    let err = orchestrator
        .submit_scan(SCOPE, vec!["S3-PUBLIC-READ".to_string()], ScanOptions::default())
        .unwrap_err();
    assert!(matches!(err, ScanError::InvalidRequest(_)));
}

// ── Store failures ──────────────────────────────────────────────────

#[tokio::test]
async fn store_failure_fails_job_without_touching_prior_findings() {
    let store = Arc::new(MemoryFindingStore::new());

    let orchestrator = build(
        StaticResourceCollector::new().with_snapshots("s3_bucket", vec![bucket("bucket-42", true)]),
        StaticLogCollector::new(),
        store.clone(),
        TableBaseline::new(),
    );
    let job_id = orchestrator
        .submit_scan(SCOPE, vec!["S3-PUBLIC-READ".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap();
    await_terminal(&orchestrator, job_id).await;

    // Remediated scan whose save fails: job FAILED, prior set intact.
    store.set_fail_saves(true);
    let orchestrator = build(
        StaticResourceCollector::new().with_snapshots("s3_bucket", vec![bucket("bucket-42", false)]),
        StaticLogCollector::new(),
        store.clone(),
        TableBaseline::new(),
    );
    let job_id = orchestrator
        .submit_scan(SCOPE, vec!["S3-PUBLIC-READ".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap();
    let job = await_terminal(&orchestrator, job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_summary.unwrap().contains("store"));

    store.set_fail_saves(false);
    let findings = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].status, FindingStatus::New);
}

// ── Rule fault isolation ────────────────────────────────────────────

#[tokio::test]
async fn panicking_rule_degrades_without_failing_the_scan() {
    let chaos = ComplianceRule {
        api_version: "patrol/v1".to_string(),
        kind: "ComplianceRule".to_string(),
        metadata: patrol_rules::RuleMetadata {
            id: "CHAOS-1".to_string(),
            name: "always panics".to_string(),
            description: None,
            tags: None,
            enabled: true,
        },
        spec: patrol_rules::schema::RuleSpec {
            resource_type: "s3_bucket".to_string(),
            severity: Severity::Medium,
            check: CheckExpr::Fail { message: "injected".to_string() },
        },
    };
    let good: Vec<ComplianceRule> = RuleCatalog::from_yaml_str(CATALOG_YAML)
        .unwrap()
        .resolve(&["S3-PUBLIC-READ".to_string()])
        .unwrap()
        .into_iter()
        .cloned()
        .collect();
    let mut rules = good;
    rules.push(chaos);
    let catalog = Arc::new(RuleCatalog::from_rules(rules).unwrap());

    let store = Arc::new(MemoryFindingStore::new());
    let orchestrator = Orchestrator::new(
        test_config(),
        catalog,
        Arc::new(
            StaticResourceCollector::new()
                .with_snapshots("s3_bucket", vec![bucket("bucket-42", true)]),
        ),
        Arc::new(StaticLogCollector::new()),
        store,
        Arc::new(TableBaseline::new()),
    );

    let job_id = orchestrator
        .submit_scan(
            SCOPE,
            vec!["S3-PUBLIC-READ".to_string(), "CHAOS-1".to_string()],
            resource_scan(&["s3_bucket"]),
        )
        .unwrap();
    let job = await_terminal(&orchestrator, job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.error_summary.unwrap().contains("degraded"));
    let findings = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].key.detector, "S3-PUBLIC-READ");
}

// ── Anomalies ───────────────────────────────────────────────────────

#[tokio::test]
async fn login_burst_raises_and_then_resolves_an_anomaly_finding() {
    let store = Arc::new(MemoryFindingStore::new());
    let baseline = || {
        TableBaseline::new().with_hourly_rate(&scope(), "cloudtrail/ConsoleLogin", 2.0)
    };
    let burst: Vec<LogEvent> = (0..12).map(|i| login_event(&format!("evt-{}", i), 5)).collect();

    let options = ScanOptions {
        resource_types: Vec::new(),
        log_sources: vec!["cloudtrail".to_string()],
        window_end: None,
    };

    let orchestrator = build(
        StaticResourceCollector::new(),
        StaticLogCollector::new().with_events("cloudtrail", burst),
        store.clone(),
        baseline(),
    );
    let job_id = orchestrator
        .submit_scan(SCOPE, Vec::new(), options.clone())
        .unwrap();
    let job = await_terminal(&orchestrator, job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.delta.new, 1);

    let findings = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, FindingKind::Anomaly);
    assert_eq!(findings[0].key.detector, "cloudtrail/ConsoleLogin");
    assert_eq!(findings[0].source, "cloudtrail");
    // score (12 - 2) / sqrt(2) ≈ 7.07 with threshold 3.0
    assert_eq!(findings[0].severity, Severity::High);

    // Quiet window on the next scan resolves the anomaly.
    let orchestrator = build(
        StaticResourceCollector::new(),
        StaticLogCollector::new(),
        store.clone(),
        baseline(),
    );
    let job_id = orchestrator.submit_scan(SCOPE, Vec::new(), options).unwrap();
    let job = await_terminal(&orchestrator, job_id).await;
    assert_eq!(job.delta.resolved, 1);
    let findings = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    assert_eq!(findings[0].status, FindingStatus::Resolved);
}

// ── Concurrency ─────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_scans_of_one_scope_do_not_duplicate_findings() {
    let store = Arc::new(MemoryFindingStore::new());
    let orchestrator = build(
        StaticResourceCollector::new().with_snapshots("s3_bucket", vec![bucket("bucket-42", true)]),
        StaticLogCollector::new(),
        store,
        TableBaseline::new(),
    );

    let a = orchestrator
        .submit_scan(SCOPE, vec!["S3-PUBLIC-READ".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap();
    let b = orchestrator
        .submit_scan(SCOPE, vec!["S3-PUBLIC-READ".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap();

    let job_a = await_terminal(&orchestrator, a).await;
    let job_b = await_terminal(&orchestrator, b).await;
    assert_eq!(job_a.status, JobStatus::Completed);
    assert_eq!(job_b.status, JobStatus::Completed);

    let findings = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    assert_eq!(findings.len(), 1);
}

/// Two racing scans of one scope covering disjoint sources: whichever save
/// lands second must carry the other's finding instead of resolving or
/// dropping it. Loses without per-scope reconciliation serialization.
#[tokio::test]
async fn concurrent_scans_of_disjoint_sources_keep_both_findings() {
    let store = Arc::new(MemoryFindingStore::new());
    let orchestrator = build(
        StaticResourceCollector::new()
            .with_snapshots("s3_bucket", vec![bucket("bucket-42", true)])
            .with_snapshots(
                "iam_role",
                vec![snapshot(
                    "iam_role",
                    "role-admin",
                    json!({ "policy": { "wildcard_action": "*" } }),
                )],
            ),
        StaticLogCollector::new(),
        store,
        TableBaseline::new(),
    );

    let a = orchestrator
        .submit_scan(SCOPE, vec!["S3-PUBLIC-READ".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap();
    let b = orchestrator
        .submit_scan(SCOPE, vec!["IAM-NO-WILDCARD".to_string()], resource_scan(&["iam_role"]))
        .unwrap();

    let job_a = await_terminal(&orchestrator, a).await;
    let job_b = await_terminal(&orchestrator, b).await;
    assert_eq!(job_a.status, JobStatus::Completed);
    assert_eq!(job_b.status, JobStatus::Completed);

    let findings = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    let detectors: Vec<&str> = findings.iter().map(|f| f.key.detector.as_str()).collect();
    assert_eq!(findings.len(), 2, "a racing save dropped the other scan's finding");
    assert!(detectors.contains(&"S3-PUBLIC-READ"));
    assert!(detectors.contains(&"IAM-NO-WILDCARD"));
    assert!(findings.iter().all(|f| f.status == FindingStatus::New));
}

#[tokio::test]
async fn finished_jobs_are_pruned_after_retention() {
    let mut config = test_config();
    config.scan.job_retention_secs = 0;
    let orchestrator = Orchestrator::new(
        config,
        catalog(),
        Arc::new(
            StaticResourceCollector::new()
                .with_snapshots("s3_bucket", vec![bucket("bucket-42", true)]),
        ),
        Arc::new(StaticLogCollector::new()),
        Arc::new(MemoryFindingStore::new()),
        Arc::new(TableBaseline::new()),
    );

    let first = orchestrator
        .submit_scan(SCOPE, vec!["S3-PUBLIC-READ".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap();
    await_terminal(&orchestrator, first).await;

    // The next submission sweeps expired terminal jobs.
    let second = orchestrator
        .submit_scan(SCOPE, vec!["S3-PUBLIC-READ".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap();
    assert!(orchestrator.get_status(first).is_none());
    assert!(orchestrator.get_status(second).is_some());
    await_terminal(&orchestrator, second).await;
}

#[tokio::test]
async fn scopes_are_isolated_from_each_other() {
    let other = Scope::new("acct-2/eu-west-1").unwrap();
    let mut foreign = bucket("bucket-eu", true);
    foreign.scope = other.clone();

    let store = Arc::new(MemoryFindingStore::new());
    let orchestrator = build(
        StaticResourceCollector::new()
            .with_snapshots("s3_bucket", vec![bucket("bucket-42", true), foreign]),
        StaticLogCollector::new(),
        store,
        TableBaseline::new(),
    );

    let a = orchestrator
        .submit_scan(SCOPE, vec!["S3-PUBLIC-READ".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap();
    let b = orchestrator
        .submit_scan("acct-2/eu-west-1", vec!["S3-PUBLIC-READ".to_string()], resource_scan(&["s3_bucket"]))
        .unwrap();
    await_terminal(&orchestrator, a).await;
    await_terminal(&orchestrator, b).await;

    let here = orchestrator
        .list_findings(&scope(), &FindingFilter::default())
        .await
        .unwrap();
    let there = orchestrator
        .list_findings(&other, &FindingFilter::default())
        .await
        .unwrap();
    assert_eq!(here.len(), 1);
    assert_eq!(here[0].key.resource_id, "bucket-42");
    assert_eq!(there.len(), 1);
    assert_eq!(there[0].key.resource_id, "bucket-eu");
}
