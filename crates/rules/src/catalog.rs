//! Filesystem rule catalog loader.
//!
//! Reads `.yaml` / `.yml` files from a directory, one or more documents per
//! file, into an in-memory catalog keyed by rule id. Rule identity is the
//! metadata id, stable across catalog updates.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::RuleError;
use crate::schema::ComplianceRule;

/// Read-only catalog of compliance rules keyed by rule id.
#[derive(Debug, Default, Clone)]
pub struct RuleCatalog {
    rules: HashMap<String, ComplianceRule>,
}

impl RuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from already-parsed rules. Duplicate ids are an error.
    pub fn from_rules(rules: Vec<ComplianceRule>) -> Result<Self, RuleError> {
        let mut catalog = Self::new();
        for rule in rules {
            catalog.insert(rule)?;
        }
        Ok(catalog)
    }

    /// Parse a YAML string containing one or more rule documents.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RuleError> {
        let mut catalog = Self::new();
        catalog.extend_from_yaml(yaml, "<inline>")?;
        Ok(catalog)
    }

    /// Load every `.yaml` / `.yml` file in `dir` (non-recursive).
    ///
    /// Files that fail to parse abort the load; a half-loaded catalog is
    /// worse than a loud startup failure.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, RuleError> {
        let dir = dir.as_ref();
        let mut catalog = Self::new();

        let entries = fs::read_dir(dir).map_err(|e| RuleError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| RuleError::Io {
                path: dir.display().to_string(),
                source: e,
            })?;
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "yaml" || e == "yml")
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }

            let content = fs::read_to_string(&path).map_err(|e| RuleError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            catalog.extend_from_yaml(&content, &path.display().to_string())?;
        }

        info!(dir = %dir.display(), rules = catalog.len(), "rule catalog loaded");
        Ok(catalog)
    }

    fn extend_from_yaml(&mut self, yaml: &str, path: &str) -> Result<(), RuleError> {
        for document in serde_yaml::Deserializer::from_str(yaml) {
            let rule = ComplianceRule::deserialize(document).map_err(|e| RuleError::Parse {
                path: path.to_string(),
                message: e.to_string(),
            })?;
            if !rule.metadata.enabled {
                warn!(rule_id = %rule.rule_id(), "skipping disabled rule");
                continue;
            }
            self.insert(rule)?;
        }
        Ok(())
    }

    fn insert(&mut self, rule: ComplianceRule) -> Result<(), RuleError> {
        let id = rule.rule_id().to_string();
        if self.rules.contains_key(&id) {
            return Err(RuleError::DuplicateRule(id));
        }
        self.rules.insert(id, rule);
        Ok(())
    }

    pub fn get(&self, rule_id: &str) -> Option<&ComplianceRule> {
        self.rules.get(rule_id)
    }

    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.contains_key(rule_id)
    }

    /// Resolve a set of requested rule ids, failing on the first unknown id.
    pub fn resolve(&self, rule_ids: &[String]) -> Result<Vec<&ComplianceRule>, RuleError> {
        rule_ids
            .iter()
            .map(|id| {
                self.get(id)
                    .ok_or_else(|| RuleError::UnknownRule(id.clone()))
            })
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TWO_RULES: &str = r#"
apiVersion: patrol/v1
kind: ComplianceRule
metadata:
  id: S3-PUBLIC-READ
  name: No public read
spec:
  resource_type: s3_bucket
  severity: high
  check:
    eq: { path: acl.public_read, value: false }
---
apiVersion: patrol/v1
kind: ComplianceRule
metadata:
  id: SG-OPEN-SSH
  name: No SSH open to the world
spec:
  resource_type: security_group
  severity: critical
  check:
    absent: { path: ingress.0.0.0.0/0.22 }
"#;

    #[test]
    fn multi_document_yaml() {
        let catalog = RuleCatalog::from_yaml_str(TWO_RULES).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("S3-PUBLIC-READ"));
        assert!(catalog.contains("SG-OPEN-SSH"));
    }

    #[test]
    fn duplicate_id_is_error() {
        let doubled = format!("{}---{}", TWO_RULES, TWO_RULES);
        assert!(matches!(
            RuleCatalog::from_yaml_str(&doubled),
            Err(RuleError::DuplicateRule(_))
        ));
    }

    #[test]
    fn disabled_rules_skipped() {
        let yaml = TWO_RULES.replace(
            "  id: SG-OPEN-SSH\n  name: No SSH open to the world\n",
            "  id: SG-OPEN-SSH\n  name: No SSH open to the world\n  enabled: false\n",
        );
        let catalog = RuleCatalog::from_yaml_str(&yaml).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(!catalog.contains("SG-OPEN-SSH"));
    }

    #[test]
    fn resolve_unknown_rule() {
        let catalog = RuleCatalog::from_yaml_str(TWO_RULES).unwrap();
        let err = catalog
            .resolve(&["S3-PUBLIC-READ".to_string(), "NOPE".to_string()])
            .unwrap_err();
        assert!(matches!(err, RuleError::UnknownRule(id) if id == "NOPE"));
    }

    #[test]
    fn load_dir_reads_yaml_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("s3.yaml")).unwrap();
        f.write_all(TWO_RULES.as_bytes()).unwrap();
        // Non-YAML files are ignored.
        std::fs::write(dir.path().join("README.md"), "not a rule").unwrap();

        let catalog = RuleCatalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn load_dir_aborts_on_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "kind: [broken").unwrap();
        assert!(matches!(
            RuleCatalog::load_dir(dir.path()),
            Err(RuleError::Parse { .. })
        ));
    }
}
