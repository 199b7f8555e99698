//! The idempotent finding merge.
//!
//! Matches raw detections against the prior finding set by logical identity
//! and computes lifecycle transitions:
//!
//! - unmatched raw → NEW
//! - matched, re-detected in a later scan → ACTIVE (NEW becomes ACTIVE on
//!   the second consecutive detection)
//! - prior present, absent from raw, source covered → RESOLVED, retained for
//!   one cycle
//! - prior whose source this scan did not cover → carried over unchanged
//!
//! Replays are recognized by timestamp: a matched finding whose
//! `last_seen_at` already equals `now` (or a RESOLVED one whose
//! `resolved_at` equals `now`) passes through untouched, which makes
//! reconciling twice with identical input a no-op.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use patrol_core::{
    Finding, FindingDelta, FindingKey, FindingStatus, RawFinding, Scope,
};

/// The collection sources (resource types and log sources) a scan fully
/// collected and evaluated. Findings from uncovered sources are never
/// resolved by that scan.
#[derive(Debug, Clone, Default)]
pub struct CoveredSources(HashSet<String>);

impl CoveredSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I: IntoIterator<Item = S>, S: Into<String>>(names: I) -> Self {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn add(&mut self, name: impl Into<String>) {
        self.0.insert(name.into());
    }

    pub fn covers(&self, source: &str) -> bool {
        self.0.contains(source)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The durable set to persist, plus the per-scan delta.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub findings: Vec<Finding>,
    pub delta: FindingDelta,
}

/// Merge raw detections into the prior finding set for a scope.
///
/// Pure: the caller stamps `now` once per scan and supplies prior state;
/// repeated invocation with identical inputs yields an identical output.
pub fn reconcile(
    scope: &Scope,
    raw: &[RawFinding],
    prior: &[Finding],
    covered: &CoveredSources,
    now: DateTime<Utc>,
) -> ReconcileOutcome {
    // Collapse raw duplicates per identity: highest severity wins, ties keep
    // the first occurrence.
    let mut raw_by_key: HashMap<FindingKey, &RawFinding> = HashMap::new();
    for rf in raw {
        let key = FindingKey::from_raw(scope, rf);
        match raw_by_key.get(&key) {
            Some(existing) if existing.severity() >= rf.severity() => {}
            _ => {
                raw_by_key.insert(key, rf);
            }
        }
    }

    let mut output: Vec<Finding> = Vec::with_capacity(raw_by_key.len() + prior.len());
    let mut matched_keys: HashSet<&FindingKey> = HashSet::new();

    // Pass 1: prior findings drive retention, resolution, and carry-over.
    for existing in prior {
        if let Some(rf) = raw_by_key.get(&existing.key) {
            matched_keys.insert(&existing.key);
            if existing.is_resolved() {
                // Re-detected after resolution: a fresh NEW finding replaces
                // the archived one (same deterministic id, new lifecycle).
                output.push(new_finding(&existing.key, rf, now));
            } else if existing.last_seen_at >= now {
                // Replay of the same scan: untouched.
                output.push(existing.clone());
            } else {
                // Second consecutive detection promotes NEW to ACTIVE.
                let mut updated = existing.clone();
                updated.status = FindingStatus::Active;
                updated.last_seen_at = now;
                updated.severity = rf.severity();
                updated.detail = rf.detail().to_string();
                output.push(updated);
            }
            continue;
        }

        // Not re-detected.
        if existing.is_resolved() {
            // Retained for exactly one cycle after resolution, then dropped
            // for archival by the external store.
            if existing.resolved_at == Some(now) {
                output.push(existing.clone());
            } else {
                debug!(finding_id = %existing.finding_id, "resolved finding aged out");
            }
        } else if covered.covers(&existing.source) {
            let mut resolved = existing.clone();
            resolved.status = FindingStatus::Resolved;
            resolved.resolved_at = Some(now);
            output.push(resolved);
        } else {
            // This scan did not look at the finding's source; no verdict.
            output.push(existing.clone());
        }
    }

    // Pass 2: raw findings with no prior match become NEW.
    for (key, rf) in &raw_by_key {
        if !matched_keys.contains(key) {
            output.push(new_finding(key, rf, now));
        }
    }

    output.sort_by(|a, b| a.finding_id.cmp(&b.finding_id));

    // The delta is derived from the output set alone, so a replayed merge
    // reports the same delta.
    let delta = FindingDelta {
        new: output
            .iter()
            .filter(|f| !f.is_resolved() && f.first_seen_at == now)
            .count(),
        resolved: output
            .iter()
            .filter(|f| f.is_resolved() && f.resolved_at == Some(now))
            .count(),
        still_active: output
            .iter()
            .filter(|f| !f.is_resolved() && f.first_seen_at < now)
            .count(),
    };

    ReconcileOutcome {
        findings: output,
        delta,
    }
}

fn new_finding(key: &FindingKey, rf: &RawFinding, now: DateTime<Utc>) -> Finding {
    Finding {
        finding_id: key.finding_id(),
        key: key.clone(),
        kind: rf.kind(),
        source: rf.source().to_string(),
        severity: rf.severity(),
        status: FindingStatus::New,
        first_seen_at: now,
        last_seen_at: now,
        resolved_at: None,
        detail: rf.detail().to_string(),
    }
}
