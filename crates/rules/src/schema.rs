//! YAML rule document schema with serde deserialization.
//!
//! One document per rule:
//!
//! ```yaml
//! apiVersion: patrol/v1
//! kind: ComplianceRule
//! metadata:
//!   id: S3-PUBLIC-READ
//!   name: S3 buckets must not allow public read
//! spec:
//!   resource_type: s3_bucket
//!   severity: high
//!   check:
//!     eq: { path: acl.public_read, value: false }
//! ```

use serde::{Deserialize, Serialize};

use patrol_core::Severity;

use crate::check::CheckExpr;

/// Top-level compliance rule definition parsed from YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ComplianceRule {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: RuleMetadata,
    pub spec: RuleSpec,
}

impl ComplianceRule {
    pub fn rule_id(&self) -> &str {
        &self.metadata.id
    }
}

/// Rule identity and description. `id` is stable across catalog updates;
/// the spec body may change under the same id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// The evaluatable body of a rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    /// Resource type this rule applies to; snapshots of any other type are
    /// not-applicable (no violation, no error).
    pub resource_type: String,
    /// Severity is an attribute of the rule, not computed per violation.
    pub severity: Severity,
    /// The compliant condition. A snapshot failing the check is a violation.
    ///
    /// serde_yaml 0.9 only accepts `!tag` syntax for externally tagged enums;
    /// the singleton-map helper lets rule files use the plain `eq: {...}`
    /// mapping form at every nesting level.
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub check: CheckExpr,
}
