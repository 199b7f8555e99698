//! Declarative compliance rules: YAML schema, catalog loading, and the
//! deterministic rule evaluator.

pub mod catalog;
pub mod check;
pub mod engine;
pub mod error;
pub mod schema;

pub use catalog::RuleCatalog;
pub use check::{CheckExpr, CheckOutcome};
pub use engine::{EvalOutcome, RuleEngine, RuleEvaluationError};
pub use error::RuleError;
pub use schema::{ComplianceRule, RuleMetadata};
