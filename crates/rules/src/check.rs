//! The tagged-variant check expression tree.
//!
//! A check describes the *compliant* condition over a snapshot's
//! configuration. Leaves address dotted configuration paths; interior nodes
//! combine children with `all`, `any`, or `not`. Evaluation is pure and total:
//! every check yields compliant, non-compliant (with detail), or
//! not-applicable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use patrol_core::ResourceSnapshot;

/// Result of evaluating one check against one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Compliant,
    NonCompliant(String),
    /// The check could not assess this snapshot (e.g. a comparison against a
    /// configuration path the resource does not have). Not an error and not
    /// a violation.
    NotApplicable,
}

/// Check expression, externally tagged in YAML:
/// `eq: { path: acl.public_read, value: false }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CheckExpr {
    /// Value at `path` must equal `value`.
    Eq { path: String, value: Value },
    /// Value at `path` must not equal `value`.
    Ne { path: String, value: Value },
    /// `path` must be present.
    Exists { path: String },
    /// `path` must be absent.
    Absent { path: String },
    /// Value at `path` must be one of `values`.
    In { path: String, values: Vec<Value> },
    /// Numeric value at `path` must be strictly greater than `value`.
    Gt { path: String, value: f64 },
    /// Numeric value at `path` must be strictly less than `value`.
    Lt { path: String, value: f64 },
    /// All children must hold.
    All(Vec<CheckExpr>),
    /// Fault-injection check that panics on evaluation. Only compiled with
    /// the `fault-injection` feature; used to verify rule isolation.
    #[cfg(feature = "fault-injection")]
    Fail { message: String },
    /// At least one child must hold.
    Any(Vec<CheckExpr>),
    /// Child must not hold.
    Not(Box<CheckExpr>),
}

impl CheckExpr {
    /// Evaluate this check against a snapshot's configuration.
    pub fn evaluate(&self, snapshot: &ResourceSnapshot) -> CheckOutcome {
        match self {
            CheckExpr::Eq { path, value } => match snapshot.config_value(path) {
                None => CheckOutcome::NotApplicable,
                Some(actual) if actual == value => CheckOutcome::Compliant,
                Some(actual) => CheckOutcome::NonCompliant(format!(
                    "{} is {} (expected {})",
                    path, actual, value
                )),
            },
            CheckExpr::Ne { path, value } => match snapshot.config_value(path) {
                None => CheckOutcome::NotApplicable,
                Some(actual) if actual != value => CheckOutcome::Compliant,
                Some(_) => CheckOutcome::NonCompliant(format!(
                    "{} must not be {}",
                    path, value
                )),
            },
            CheckExpr::Exists { path } => match snapshot.config_value(path) {
                Some(_) => CheckOutcome::Compliant,
                None => CheckOutcome::NonCompliant(format!("{} is not set", path)),
            },
            CheckExpr::Absent { path } => match snapshot.config_value(path) {
                None => CheckOutcome::Compliant,
                Some(actual) => CheckOutcome::NonCompliant(format!(
                    "{} is set to {} (must be absent)",
                    path, actual
                )),
            },
            CheckExpr::In { path, values } => match snapshot.config_value(path) {
                None => CheckOutcome::NotApplicable,
                Some(actual) if values.contains(actual) => CheckOutcome::Compliant,
                Some(actual) => CheckOutcome::NonCompliant(format!(
                    "{} is {} (allowed: {})",
                    path,
                    actual,
                    values
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            },
            CheckExpr::Gt { path, value } => Self::numeric(snapshot, path, |n| n > *value, || {
                format!("{} must be greater than {}", path, value)
            }),
            CheckExpr::Lt { path, value } => Self::numeric(snapshot, path, |n| n < *value, || {
                format!("{} must be less than {}", path, value)
            }),
            #[cfg(feature = "fault-injection")]
            CheckExpr::Fail { message } => panic!("{}", message),
            CheckExpr::All(children) => {
                let mut applicable = false;
                for child in children {
                    match child.evaluate(snapshot) {
                        CheckOutcome::Compliant => applicable = true,
                        CheckOutcome::NonCompliant(detail) => {
                            return CheckOutcome::NonCompliant(detail)
                        }
                        CheckOutcome::NotApplicable => {}
                    }
                }
                if applicable {
                    CheckOutcome::Compliant
                } else {
                    CheckOutcome::NotApplicable
                }
            }
            CheckExpr::Any(children) => {
                let mut failures = Vec::new();
                for child in children {
                    match child.evaluate(snapshot) {
                        CheckOutcome::Compliant => return CheckOutcome::Compliant,
                        CheckOutcome::NonCompliant(detail) => failures.push(detail),
                        CheckOutcome::NotApplicable => {}
                    }
                }
                if failures.is_empty() {
                    CheckOutcome::NotApplicable
                } else {
                    CheckOutcome::NonCompliant(format!(
                        "no alternative held: {}",
                        failures.join("; ")
                    ))
                }
            }
            CheckExpr::Not(child) => match child.evaluate(snapshot) {
                CheckOutcome::Compliant => {
                    CheckOutcome::NonCompliant("negated condition held".to_string())
                }
                CheckOutcome::NonCompliant(_) => CheckOutcome::Compliant,
                CheckOutcome::NotApplicable => CheckOutcome::NotApplicable,
            },
        }
    }

    fn numeric(
        snapshot: &ResourceSnapshot,
        path: &str,
        predicate: impl Fn(f64) -> bool,
        detail: impl Fn() -> String,
    ) -> CheckOutcome {
        match snapshot.config_value(path).and_then(|v| v.as_f64()) {
            None => CheckOutcome::NotApplicable,
            Some(n) if predicate(n) => CheckOutcome::Compliant,
            Some(_) => CheckOutcome::NonCompliant(detail()),
        }
    }
}
