//! Ontology configuration file format and the hot-reloadable handle.
//!
//! ```toml
//! [aliases]
//! Corporation = "Company"
//!
//! [hierarchy]
//! Organization = ["Company", "NonProfit"]
//!
//! [[forbidden_merge]]
//! types = ["Animal", "Company"]
//! reason = "organisms are not legal entities"
//!
//! [compliance.Medication]
//! allowed = ["Disease", "Symptom"]
//! forbidden = ["SoftwareBug"]
//!
//! [compliance.Medication.relations.CAUSES]
//! allowed = ["SideEffect"]
//!
//! [context.Company]
//! expected_neighbors = ["Person", "Product", "Place"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::OntologyError;

use super::rules::{ComplianceRule, TypeRuleSet};

/// Raw TOML shape of an ontology file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OntologyFile {
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub hierarchy: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub forbidden_merge: Vec<ForbiddenMergeEntry>,
    #[serde(default)]
    pub compliance: BTreeMap<String, ComplianceRule>,
    #[serde(default)]
    pub context: BTreeMap<String, ContextEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForbiddenMergeEntry {
    pub types: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextEntry {
    #[serde(default)]
    pub expected_neighbors: Vec<String>,
}

impl OntologyFile {
    /// Convert into an immutable rule set, validating forbidden-merge arity.
    pub fn into_rules(self) -> Result<TypeRuleSet, OntologyError> {
        let mut builder = TypeRuleSet::builder();
        for (alias, canonical) in self.aliases {
            builder = builder.alias(alias, canonical);
        }
        for (parent, children) in self.hierarchy {
            for child in children {
                builder = builder.subtype(parent.clone(), child);
            }
        }
        for entry in self.forbidden_merge {
            let [a, b] = <[String; 2]>::try_from(entry.types).map_err(|types| {
                OntologyError::Parse {
                    message: format!(
                        "forbidden_merge entries need exactly two types, got {}",
                        types.len()
                    ),
                }
            })?;
            builder = builder.forbid_merge(a, b, entry.reason);
        }
        for (source, rule) in self.compliance {
            builder = builder.compliance(source, rule);
        }
        for (ty, entry) in self.context {
            builder = builder.expect_neighbors(ty, entry.expected_neighbors);
        }
        Ok(builder.build())
    }
}

impl TypeRuleSet {
    /// Parse a rule set from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, OntologyError> {
        let file: OntologyFile = toml::from_str(text).map_err(|e| OntologyError::Parse {
            message: e.to_string(),
        })?;
        file.into_rules()
    }

    /// Load a rule set from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, OntologyError> {
        let text = std::fs::read_to_string(path).map_err(|source| OntologyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let rules = Self::from_toml_str(&text)?;
        tracing::info!(
            path = %path.display(),
            forbidden = rules.forbidden_count(),
            compliance = rules.compliance_count(),
            "loaded ontology"
        );
        Ok(rules)
    }
}

/// Shared, swappable reference to the current rule set.
///
/// Readers take an `Arc` snapshot and keep using it for the whole operation,
/// so a concurrent [`replace`](Self::replace) never changes rules mid-decision.
/// An empty handle yields no rule set, which checkers treat as fail-closed.
#[derive(Debug, Clone, Default)]
pub struct OntologyHandle {
    current: Arc<RwLock<Option<Arc<TypeRuleSet>>>>,
}

impl OntologyHandle {
    /// A handle over a loaded rule set.
    pub fn new(rules: TypeRuleSet) -> Self {
        Self {
            current: Arc::new(RwLock::new(Some(Arc::new(rules)))),
        }
    }

    /// A handle with nothing loaded.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot of the current rule set.
    pub fn snapshot(&self) -> Option<Arc<TypeRuleSet>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Atomically swap in a new rule set (explicit hot reload).
    pub fn replace(&self, rules: TypeRuleSet) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(Arc::new(rules));
    }

    /// Whether a rule set is loaded.
    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[aliases]
Corporation = "Company"

[hierarchy]
Organization = ["Company"]

[[forbidden_merge]]
types = ["Animal", "Company"]
reason = "organisms are not legal entities"

[compliance.Medication]
allowed = ["Disease"]
forbidden = ["SoftwareBug"]

[compliance.Medication.relations.CAUSES]
allowed = ["SideEffect"]

[context.Company]
expected_neighbors = ["Person", "Product"]
"#;

    #[test]
    fn parses_sample_ontology() {
        let rules = TypeRuleSet::from_toml_str(SAMPLE).unwrap();
        assert_eq!(rules.canonical("corporation"), "Company");
        assert!(rules.forbidden_between("Company", "Animal").is_some());
        let (_, rule) = rules.compliance_rule("Medication").unwrap();
        assert!(rule.forbidden.contains("SoftwareBug"));
        assert!(rule.targets_for("CAUSES").allowed.contains("SideEffect"));
        assert!(rules.expected_neighbors("Company").contains("Person"));
    }

    #[test]
    fn rejects_forbidden_merge_with_three_types() {
        let text = r#"
[[forbidden_merge]]
types = ["A", "B", "C"]
"#;
        let err = TypeRuleSet::from_toml_str(text).unwrap_err();
        assert!(matches!(err, OntologyError::Parse { .. }));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = TypeRuleSet::from_toml_str("[aliases\n").unwrap_err();
        assert!(matches!(err, OntologyError::Parse { .. }));
    }

    #[test]
    fn handle_replace_swaps_snapshot() {
        let handle = OntologyHandle::empty();
        assert!(!handle.is_loaded());
        handle.replace(TypeRuleSet::from_toml_str(SAMPLE).unwrap());
        let before = handle.snapshot().unwrap();
        handle.replace(TypeRuleSet::default());
        let after = handle.snapshot().unwrap();
        assert_eq!(before.forbidden_count(), 1);
        assert_eq!(after.forbidden_count(), 0);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ontology.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let rules = TypeRuleSet::from_path(&path).unwrap();
        assert_eq!(rules.compliance_count(), 1);
    }
}
