//! Collector adapter traits.
//!
//! Implementations handle the specifics of one cloud provider's APIs and
//! normalize the responses into [`ResourceSnapshot`] / [`LogEvent`] records.
//! Provider credentials and sessions are implementation state passed in at
//! construction, scoped per collector instance — never process-wide.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use patrol_core::{LogEvent, ResourceSnapshot, Scope, TimeWindow};

use crate::error::CollectorError;

/// One collection unit a scan fans out over: a resource type or a log source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum SourceId {
    /// A resource type, e.g. `s3_bucket`.
    Resource(String),
    /// A log source, e.g. `cloudtrail`.
    Log(String),
}

impl SourceId {
    pub fn name(&self) -> &str {
        match self {
            SourceId::Resource(name) | SourceId::Log(name) => name,
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceId::Resource(name) => write!(f, "resource:{}", name),
            SourceId::Log(name) => write!(f, "log:{}", name),
        }
    }
}

/// Fetches configuration snapshots for every resource of one type in a scope.
#[async_trait]
pub trait ResourceCollector: Send + Sync {
    /// Fetch all resources of `resource_type` visible in `scope`.
    ///
    /// May block for up to the provider's API latency; the caller wraps the
    /// call in a deadline and retry policy.
    async fn fetch(
        &self,
        scope: &Scope,
        resource_type: &str,
    ) -> Result<Vec<ResourceSnapshot>, CollectorError>;
}

/// Fetches normalized log events for one source and time window in a scope.
#[async_trait]
pub trait LogCollector: Send + Sync {
    /// Fetch events from `source` within `window`, ordered by timestamp.
    async fn fetch(
        &self,
        scope: &Scope,
        source: &str,
        window: TimeWindow,
    ) -> Result<Vec<LogEvent>, CollectorError>;
}
