//! Raw detection records and the durable, reconciled [`Finding`].
//!
//! `Violation` and `AnomalyRecord` are transient — produced during one scan
//! and discarded after reconciliation. `Finding` is the durable unit with a
//! deterministic identity, so repeated scans update rather than duplicate it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{FindingKind, Scope, Severity};

/// A compliance rule violation detected for one resource in one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub resource_id: String,
    /// Resource type the snapshot came from — lets the reconciler limit
    /// resolution to sources a partial scan actually covered.
    pub resource_type: String,
    pub severity: Severity,
    pub detail: String,
    pub detected_at: DateTime<Utc>,
}

/// A log-derived anomaly detected for one (scope, pattern) in one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// Stable pattern identifier, e.g. `cloudtrail/ConsoleLogin`.
    pub anomaly_kind: String,
    pub scope: Scope,
    /// Log source the events came from.
    pub source: String,
    pub related_event_ids: Vec<String>,
    /// Deviation magnitude — higher is more anomalous.
    pub score: f64,
    /// Severity mapped from the score by the anomaly engine's configured
    /// thresholds.
    pub severity: Severity,
    pub detail: String,
    pub detected_at: DateTime<Utc>,
}

/// Either raw record, as handed to the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RawFinding {
    Compliance(Violation),
    Anomaly(AnomalyRecord),
}

impl RawFinding {
    pub fn kind(&self) -> FindingKind {
        match self {
            RawFinding::Compliance(_) => FindingKind::Compliance,
            RawFinding::Anomaly(_) => FindingKind::Anomaly,
        }
    }

    /// The detector identifier half of the logical identity.
    pub fn detector(&self) -> &str {
        match self {
            RawFinding::Compliance(v) => &v.rule_id,
            RawFinding::Anomaly(a) => &a.anomaly_kind,
        }
    }

    /// The resource half of the logical identity. Anomalies are keyed to
    /// their scope-wide pattern, not an individual resource.
    pub fn resource_id(&self) -> &str {
        match self {
            RawFinding::Compliance(v) => &v.resource_id,
            RawFinding::Anomaly(_) => "-",
        }
    }

    /// The collection source that produced this record (resource type or
    /// log source name).
    pub fn source(&self) -> &str {
        match self {
            RawFinding::Compliance(v) => &v.resource_type,
            RawFinding::Anomaly(a) => &a.source,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            RawFinding::Compliance(v) => v.severity,
            RawFinding::Anomaly(a) => a.severity,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            RawFinding::Compliance(v) => &v.detail,
            RawFinding::Anomaly(a) => &a.detail,
        }
    }
}

/// Logical identity of a finding: one non-resolved finding may exist per key
/// at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FindingKey {
    pub scope: Scope,
    /// `rule_id` for compliance findings, `anomaly_kind` for anomalies.
    pub detector: String,
    pub resource_id: String,
}

impl FindingKey {
    pub fn from_raw(scope: &Scope, raw: &RawFinding) -> Self {
        Self {
            scope: scope.clone(),
            detector: raw.detector().to_string(),
            resource_id: raw.resource_id().to_string(),
        }
    }

    /// Deterministic finding id: hex SHA-256 over the identity tuple.
    /// Field separators prevent ambiguity between adjacent fields.
    pub fn finding_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.scope.as_str().as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.detector.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.resource_id.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Lifecycle state of a durable finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    /// Detected for the first time in the most recent scan.
    New,
    /// Re-detected on at least two consecutive scans.
    Active,
    /// No longer detected by a scan that covered its source.
    Resolved,
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingStatus::New => write!(f, "new"),
            FindingStatus::Active => write!(f, "active"),
            FindingStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// The durable, deduplicated finding record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub finding_id: String,
    pub key: FindingKey,
    pub kind: FindingKind,
    /// Collection source (resource type or log source) this finding belongs
    /// to; a scan that did not cover the source never resolves the finding.
    pub source: String,
    pub severity: Severity,
    pub status: FindingStatus,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub detail: String,
}

impl Finding {
    pub fn is_resolved(&self) -> bool {
        self.status == FindingStatus::Resolved
    }
}

/// Per-scan summary of lifecycle transitions, reported on the [`crate::ScanJob`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingDelta {
    pub new: usize,
    pub resolved: usize,
    pub still_active: usize,
}

/// Filter for `list_findings`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingFilter {
    pub status: Option<FindingStatus>,
    pub kind: Option<FindingKind>,
    pub min_severity: Option<Severity>,
}

impl FindingFilter {
    pub fn matches(&self, finding: &Finding) -> bool {
        if let Some(status) = self.status {
            if finding.status != status {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if finding.kind != kind {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            if finding.severity < min {
                return false;
            }
        }
        true
    }
}
