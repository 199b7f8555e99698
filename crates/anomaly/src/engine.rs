//! Sliding-window frequency scoring.
//!
//! Events are deduplicated by id, bounded to the window (with a lateness
//! tolerance for out-of-order arrivals), grouped by (scope, pattern key) and
//! compared against the baseline's expected count. The deviation score is a
//! Poisson-style z — (observed − expected) / sqrt(max(expected, 1)) — so a
//! burst over a quiet baseline scores much higher than the same burst over a
//! busy one.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use patrol_core::config::AnomalyConfig;
use patrol_core::{AnomalyRecord, LogEvent, Scope, Severity};

use crate::baseline::BaselineProvider;

/// Map a deviation score to a finding severity relative to the configured
/// threshold: under 2× → Medium, under 4× → High, beyond → Critical.
pub fn severity_for_score(score: f64, threshold: f64) -> Severity {
    if score < threshold * 2.0 {
        Severity::Medium
    } else if score < threshold * 4.0 {
        Severity::High
    } else {
        Severity::Critical
    }
}

pub struct AnomalyEngine {
    config: AnomalyConfig,
}

impl AnomalyEngine {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    /// Evaluate one source's events against the baseline.
    ///
    /// `window_end` fixes the window `[window_end - window, window_end)`;
    /// `detected_at` is stamped by the caller. Output is deterministic for
    /// fixed inputs: records are sorted by pattern key and related event ids
    /// are sorted within each record.
    pub fn evaluate(
        &self,
        events: &[LogEvent],
        baseline: &dyn BaselineProvider,
        window_end: DateTime<Utc>,
        detected_at: DateTime<Utc>,
    ) -> Vec<AnomalyRecord> {
        let window = self.window();
        let window_start = window_end
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(1));
        let late_cutoff = window_start
            - chrono::Duration::seconds(self.config.lateness_tolerance_secs as i64);

        // Dedup by event id; first occurrence wins.
        let mut seen: HashSet<&str> = HashSet::new();
        // BTreeMap keys keep group iteration deterministic.
        let mut groups: BTreeMap<(Scope, String), Vec<&LogEvent>> = BTreeMap::new();
        let mut ignored_late = 0usize;

        for event in events {
            if !seen.insert(&event.event_id) {
                continue;
            }
            if event.timestamp < late_cutoff || event.timestamp >= window_end {
                ignored_late += 1;
                continue;
            }
            let pattern = pattern_key(event);
            groups
                .entry((event.scope.clone(), pattern))
                .or_default()
                .push(event);
        }

        if ignored_late > 0 {
            debug!(
                ignored = ignored_late,
                window_end = %window_end,
                "events outside window and lateness tolerance ignored"
            );
        }

        let mut records = Vec::new();
        for ((scope, pattern), group) in groups {
            let observed = group.len() as f64;
            let expected = baseline
                .expected_count(&scope, &pattern, window)
                .unwrap_or(0.0);
            let score = (observed - expected) / expected.max(1.0).sqrt();
            if score <= self.config.deviation_threshold {
                continue;
            }

            let mut related: Vec<String> =
                group.iter().map(|e| e.event_id.clone()).collect();
            related.sort();
            let source = group[0].source.clone();

            records.push(AnomalyRecord {
                anomaly_kind: pattern.clone(),
                scope,
                source,
                related_event_ids: related,
                score,
                severity: severity_for_score(score, self.config.deviation_threshold),
                detail: format!(
                    "{}: observed {} events, expected {:.1} (score {:.2})",
                    pattern, observed, expected, score
                ),
                detected_at,
            });
        }
        records
    }
}

/// Pattern key: `source/event_type`, falling back to `unknown` when the
/// event carries no type attribute.
fn pattern_key(event: &LogEvent) -> String {
    let event_type = event.attr_str("event_type").unwrap_or("unknown");
    format!("{}/{}", event.source, event_type)
}
