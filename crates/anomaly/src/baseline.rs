//! The baseline collaborator.
//!
//! The engine only consumes a baseline; how it is trained or updated is a
//! separate concern. Implementations must be cheap to query — the engine
//! calls them once per (scope, pattern) group per window.

use std::collections::HashMap;
use std::time::Duration;

use patrol_core::Scope;

/// Read-only source of expected event counts per (scope, pattern) window.
///
/// Swappable strategy: the default [`TableBaseline`] is a static rate table;
/// a learned model plugs in behind the same trait.
pub trait BaselineProvider: Send + Sync {
    /// Expected number of events for `pattern_key` in `scope` over a window
    /// of the given length. `None` means the pattern has no baseline — the
    /// engine treats it as expected zero.
    fn expected_count(&self, scope: &Scope, pattern_key: &str, window: Duration) -> Option<f64>;
}

/// Baseline backed by a table of hourly rates keyed by (scope, pattern).
#[derive(Debug, Default, Clone)]
pub struct TableBaseline {
    /// (scope, pattern_key) → expected events per hour.
    hourly_rates: HashMap<(Scope, String), f64>,
}

impl TableBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hourly_rate(mut self, scope: &Scope, pattern_key: &str, rate: f64) -> Self {
        self.hourly_rates
            .insert((scope.clone(), pattern_key.to_string()), rate);
        self
    }
}

impl BaselineProvider for TableBaseline {
    fn expected_count(&self, scope: &Scope, pattern_key: &str, window: Duration) -> Option<f64> {
        let rate = self
            .hourly_rates
            .get(&(scope.clone(), pattern_key.to_string()))?;
        Some(rate * window.as_secs_f64() / 3600.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_rate_to_window() {
        let scope = Scope::new("acct-1/us-east-1").unwrap();
        let baseline = TableBaseline::new().with_hourly_rate(&scope, "cloudtrail/ConsoleLogin", 6.0);
        let expected = baseline
            .expected_count(&scope, "cloudtrail/ConsoleLogin", Duration::from_secs(1800))
            .unwrap();
        assert!((expected - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_pattern_is_none() {
        let scope = Scope::new("acct-1/us-east-1").unwrap();
        let baseline = TableBaseline::new();
        assert!(baseline
            .expected_count(&scope, "vpc-flow/RejectBurst", Duration::from_secs(3600))
            .is_none());
    }
}
