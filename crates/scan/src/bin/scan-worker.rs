//! scan-worker — run one scan against fixture-backed collectors.
//!
//! Loads a rule catalog directory and a JSON fixture of resource snapshots
//! and log events, submits a single scan, waits for the terminal state, and
//! prints the job result plus the reconciled findings as JSON. Useful for
//! exercising a rule catalog without live provider credentials.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use patrol_anomaly::TableBaseline;
use patrol_collector::{StaticLogCollector, StaticResourceCollector};
use patrol_core::{config::load_dotenv, FindingFilter, LogEvent, PatrolConfig, ResourceSnapshot, Scope};
use patrol_reconcile::MemoryFindingStore;
use patrol_rules::RuleCatalog;
use patrol_scan::{Orchestrator, ScanOptions};

// ── CLI ─────────────────────────────────────────────────────────────

/// Patrol scan worker — one-shot scan over fixture data.
#[derive(Parser, Debug)]
#[command(name = "scan-worker", version, about)]
struct Cli {
    /// Directory of compliance rule YAML files.
    #[arg(long, env = "PATROL_RULES_DIR", default_value = "data/rules")]
    rules_dir: String,

    /// Fixture JSON file with snapshots, events and baseline rates.
    #[arg(long, env = "PATROL_FIXTURE")]
    fixture: String,

    /// Scope to scan, e.g. acct-1/us-east-1.
    #[arg(long)]
    scope: String,

    /// Resource types to collect (repeatable).
    #[arg(long = "resource-type")]
    resource_types: Vec<String>,

    /// Log sources to collect (repeatable).
    #[arg(long = "log-source")]
    log_sources: Vec<String>,

    /// Rule ids to evaluate; defaults to the whole catalog.
    #[arg(long = "rule")]
    rules: Vec<String>,

    /// Anomaly window end as RFC 3339; defaults to now. Set this when the
    /// fixture carries fixed timestamps.
    #[arg(long)]
    window_end: Option<chrono::DateTime<chrono::Utc>>,
}

// ── Fixture ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    snapshots: Vec<ResourceSnapshot>,
    #[serde(default)]
    events: Vec<LogEvent>,
    #[serde(default)]
    baseline: Vec<BaselineEntry>,
}

#[derive(Debug, Deserialize)]
struct BaselineEntry {
    scope: Scope,
    pattern: String,
    hourly_rate: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = PatrolConfig::from_env();

    let catalog = RuleCatalog::load_dir(&cli.rules_dir)
        .with_context(|| format!("loading rule catalog from {}", cli.rules_dir))?;
    let rule_ids: Vec<String> = if cli.rules.is_empty() {
        catalog.ids().map(String::from).collect()
    } else {
        cli.rules.clone()
    };

    let fixture_raw = std::fs::read_to_string(&cli.fixture)
        .with_context(|| format!("reading fixture {}", cli.fixture))?;
    let fixture: Fixture =
        serde_json::from_str(&fixture_raw).context("parsing fixture JSON")?;

    info!(
        snapshots = fixture.snapshots.len(),
        events = fixture.events.len(),
        rules = rule_ids.len(),
        "fixture loaded"
    );

    let mut resources = StaticResourceCollector::new();
    for snapshot in fixture.snapshots {
        let resource_type = snapshot.resource_type.clone();
        resources = resources.with_snapshots(&resource_type, vec![snapshot]);
    }
    let mut logs = StaticLogCollector::new();
    for event in fixture.events {
        let source = event.source.clone();
        logs = logs.with_events(&source, vec![event]);
    }
    let mut baseline = TableBaseline::new();
    for entry in &fixture.baseline {
        baseline = baseline.with_hourly_rate(&entry.scope, &entry.pattern, entry.hourly_rate);
    }

    let store = Arc::new(MemoryFindingStore::new());
    let orchestrator = Orchestrator::new(
        config,
        Arc::new(catalog),
        Arc::new(resources),
        Arc::new(logs),
        store,
        Arc::new(baseline),
    );

    let job_id = orchestrator.submit_scan(
        &cli.scope,
        rule_ids,
        ScanOptions {
            resource_types: cli.resource_types.clone(),
            log_sources: cli.log_sources.clone(),
            window_end: cli.window_end,
        },
    )?;

    // Poll until the job reaches a terminal state.
    let job = loop {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = orchestrator
            .get_status(job_id)
            .context("job disappeared from registry")?;
        if snapshot.status.is_terminal() {
            break snapshot;
        }
    };

    let scope = Scope::new(cli.scope.as_str()).context("scope")?;
    let findings = orchestrator
        .list_findings(&scope, &FindingFilter::default())
        .await?;

    println!("{}", serde_json::to_string_pretty(&job)?);
    println!("{}", serde_json::to_string_pretty(&findings)?);
    Ok(())
}
