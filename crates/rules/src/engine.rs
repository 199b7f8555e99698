//! The rule evaluator.
//!
//! Evaluation is pure and deterministic: given the same snapshot and rule
//! versions the output is identical, independent of rule iteration order
//! (violations are sorted by rule id). A fault inside one check is caught at
//! the rule × resource boundary and recorded as a degraded result — it never
//! aborts evaluation of sibling rules or resources.

use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use tracing::warn;

use patrol_core::{ResourceSnapshot, Violation};

use crate::check::CheckOutcome;
use crate::schema::ComplianceRule;

/// A fault raised by one rule against one resource, isolated and recorded.
#[derive(Debug, Clone)]
pub struct RuleEvaluationError {
    pub rule_id: String,
    pub resource_id: String,
    pub message: String,
}

impl std::fmt::Display for RuleEvaluationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rule {} failed on {}: {}",
            self.rule_id, self.resource_id, self.message
        )
    }
}

/// Violations plus any degraded (faulted) rule × resource combinations.
#[derive(Debug, Default)]
pub struct EvalOutcome {
    pub violations: Vec<Violation>,
    pub degraded: Vec<RuleEvaluationError>,
}

pub struct RuleEngine;

impl RuleEngine {
    /// Evaluate a snapshot against a set of rules.
    ///
    /// `detected_at` is stamped by the caller once per scan — check evaluation
    /// itself never reads the clock.
    pub fn evaluate(
        snapshot: &ResourceSnapshot,
        rules: &[&ComplianceRule],
        detected_at: DateTime<Utc>,
    ) -> EvalOutcome {
        let mut outcome = EvalOutcome::default();

        for rule in rules {
            if rule.spec.resource_type != snapshot.resource_type {
                // Not applicable: wrong resource type for this rule.
                continue;
            }
            if !rule.metadata.enabled {
                continue;
            }

            let result = catch_unwind(AssertUnwindSafe(|| rule.spec.check.evaluate(snapshot)));
            match result {
                Ok(CheckOutcome::Compliant) | Ok(CheckOutcome::NotApplicable) => {}
                Ok(CheckOutcome::NonCompliant(detail)) => {
                    outcome.violations.push(Violation {
                        rule_id: rule.rule_id().to_string(),
                        resource_id: snapshot.resource_id.clone(),
                        resource_type: snapshot.resource_type.clone(),
                        severity: rule.spec.severity,
                        detail,
                        detected_at,
                    });
                }
                Err(panic) => {
                    let message = panic_message(panic);
                    warn!(
                        rule_id = %rule.rule_id(),
                        resource_id = %snapshot.resource_id,
                        message = %message,
                        "rule evaluation fault isolated"
                    );
                    outcome.degraded.push(RuleEvaluationError {
                        rule_id: rule.rule_id().to_string(),
                        resource_id: snapshot.resource_id.clone(),
                        message,
                    });
                }
            }
        }

        outcome.violations.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        outcome
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
