//! Normalized inputs to a scan: resource snapshots and log events.
//!
//! Both are immutable once constructed and live only for the duration of a
//! single scan execution — the reconciler discards them after producing the
//! durable finding set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The boundary a scan and its findings are keyed to, e.g. `acct-1/us-east-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    /// Build a scope, rejecting empty or whitespace-only input.
    pub fn new(s: impl Into<String>) -> Option<Self> {
        let s = s.into();
        if s.trim().is_empty() {
            None
        } else {
            Some(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open time window `[start, end)` for log collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// One resource's configuration as observed at collection time.
///
/// `configuration` is a flattened key → value map; nested provider structures
/// are addressed with dotted paths (e.g. `acl.public_read`). BTreeMap keeps
/// serialization deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub resource_id: String,
    /// Provider resource type, e.g. `s3_bucket`, `security_group`.
    pub resource_type: String,
    pub scope: Scope,
    pub configuration: BTreeMap<String, Value>,
    pub captured_at: DateTime<Utc>,
}

impl ResourceSnapshot {
    /// Look up a configuration value by dotted path.
    ///
    /// Flat keys win; if the exact key is absent, the path is walked into
    /// nested JSON objects segment by segment.
    pub fn config_value(&self, path: &str) -> Option<&Value> {
        if let Some(v) = self.configuration.get(path) {
            return Some(v);
        }
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.configuration.get(first)?;
        for seg in segments {
            current = current.as_object()?.get(seg)?;
        }
        Some(current)
    }
}

/// One normalized log event from an external log source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub event_id: String,
    /// Log source name, e.g. `cloudtrail`, `vpc-flow`.
    pub source: String,
    pub scope: Scope,
    pub timestamp: DateTime<Utc>,
    pub attributes: BTreeMap<String, Value>,
}

impl LogEvent {
    /// String attribute lookup helper.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}
