//! In-memory collectors backed by pre-loaded data.
//!
//! Used by the scan-worker fixture mode and by tests. Failure behavior is
//! scriptable per source: fail the first N calls transiently, or fail every
//! call permanently.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use patrol_core::{LogEvent, ResourceSnapshot, Scope, TimeWindow};

use crate::error::CollectorError;
use crate::source::{LogCollector, ResourceCollector};

#[derive(Debug, Clone)]
enum FailurePlan {
    /// Fail this many calls with a transient error, then succeed.
    Transient(u32),
    /// Fail every call with a permanent error.
    Permanent,
}

#[derive(Default)]
struct FailureScript {
    plans: Mutex<HashMap<String, FailurePlan>>,
}

impl FailureScript {
    /// Consume one scripted failure for `source`, if any remains.
    fn next_failure(&self, source: &str) -> Option<CollectorError> {
        let mut plans = self.plans.lock().unwrap();
        match plans.get_mut(source) {
            Some(FailurePlan::Permanent) => {
                Some(CollectorError::Permanent(format!("{}: access denied", source)))
            }
            Some(FailurePlan::Transient(remaining)) => {
                if *remaining == 0 {
                    plans.remove(source);
                    return None;
                }
                *remaining -= 1;
                Some(CollectorError::Transient(format!("{}: throttled", source)))
            }
            None => None,
        }
    }

    fn script(&self, source: &str, plan: FailurePlan) {
        self.plans
            .lock()
            .unwrap()
            .insert(source.to_string(), plan);
    }
}

/// In-memory [`ResourceCollector`] keyed by resource type.
#[derive(Default)]
pub struct StaticResourceCollector {
    snapshots: HashMap<String, Vec<ResourceSnapshot>>,
    failures: FailureScript,
}

impl StaticResourceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register snapshots for one resource type.
    pub fn with_snapshots(
        mut self,
        resource_type: &str,
        snapshots: Vec<ResourceSnapshot>,
    ) -> Self {
        self.snapshots
            .entry(resource_type.to_string())
            .or_default()
            .extend(snapshots);
        self
    }

    /// Fail the first `times` fetches of `resource_type` transiently.
    pub fn fail_transient(self, resource_type: &str, times: u32) -> Self {
        self.failures
            .script(resource_type, FailurePlan::Transient(times));
        self
    }

    /// Fail every fetch of `resource_type` permanently.
    pub fn fail_permanent(self, resource_type: &str) -> Self {
        self.failures.script(resource_type, FailurePlan::Permanent);
        self
    }
}

#[async_trait]
impl ResourceCollector for StaticResourceCollector {
    async fn fetch(
        &self,
        scope: &Scope,
        resource_type: &str,
    ) -> Result<Vec<ResourceSnapshot>, CollectorError> {
        if let Some(err) = self.failures.next_failure(resource_type) {
            return Err(err);
        }
        Ok(self
            .snapshots
            .get(resource_type)
            .map(|all| {
                all.iter()
                    .filter(|s| &s.scope == scope)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// In-memory [`LogCollector`] keyed by log source.
#[derive(Default)]
pub struct StaticLogCollector {
    events: HashMap<String, Vec<LogEvent>>,
    failures: FailureScript,
}

impl StaticLogCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register events for one log source.
    pub fn with_events(mut self, source: &str, events: Vec<LogEvent>) -> Self {
        self.events
            .entry(source.to_string())
            .or_default()
            .extend(events);
        self
    }

    /// Fail the first `times` fetches of `source` transiently.
    pub fn fail_transient(self, source: &str, times: u32) -> Self {
        self.failures.script(source, FailurePlan::Transient(times));
        self
    }

    /// Fail every fetch of `source` permanently.
    pub fn fail_permanent(self, source: &str) -> Self {
        self.failures.script(source, FailurePlan::Permanent);
        self
    }
}

#[async_trait]
impl LogCollector for StaticLogCollector {
    async fn fetch(
        &self,
        scope: &Scope,
        source: &str,
        window: TimeWindow,
    ) -> Result<Vec<LogEvent>, CollectorError> {
        if let Some(err) = self.failures.next_failure(source) {
            return Err(err);
        }
        let mut events: Vec<LogEvent> = self
            .events
            .get(source)
            .map(|all| {
                all.iter()
                    .filter(|e| &e.scope == scope && window.contains(e.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}
