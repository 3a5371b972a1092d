//! Type compatibility checking: the hard gate in front of every merge.
//!
//! Open world: two types are compatible unless an explicit forbidden-merge
//! rule covers them, directly or through an ancestor or descendant on either
//! side. A checker without a rule set fails closed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::OntologyError;

use super::rules::{ForbiddenMerge, TypeRuleSet};

/// Outcome of a compatibility check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compatibility {
    pub compatible: bool,
    pub reason: String,
    /// Canonical form of the first type.
    pub canonical_a: String,
    /// Canonical form of the second type.
    pub canonical_b: String,
    /// The rule that blocked the merge, if any.
    pub matched_rule: Option<ForbiddenMerge>,
}

/// Pure compatibility checker over an injected rule set.
#[derive(Debug, Clone)]
pub struct TypeChecker {
    rules: Option<Arc<TypeRuleSet>>,
}

impl TypeChecker {
    /// Create a checker over a loaded rule set.
    pub fn new(rules: Arc<TypeRuleSet>) -> Self {
        Self { rules: Some(rules) }
    }

    /// A checker with no rule set. Every pair is incompatible.
    pub fn unloaded() -> Self {
        Self { rules: None }
    }

    /// The rule set, if loaded.
    pub fn rules(&self) -> Option<&Arc<TypeRuleSet>> {
        self.rules.as_ref()
    }

    /// Canonical form of a type (the trimmed input when no rule set is loaded).
    pub fn canonical(&self, ty: &str) -> String {
        match &self.rules {
            Some(rules) => rules.canonical(ty),
            None => ty.trim().to_string(),
        }
    }

    /// Check whether entities of `type_a` and `type_b` may share a URI.
    pub fn compatible(&self, type_a: &str, type_b: &str) -> Compatibility {
        let Some(rules) = &self.rules else {
            return Compatibility {
                compatible: false,
                reason: "ontology ruleset not loaded; failing closed".into(),
                canonical_a: type_a.trim().to_string(),
                canonical_b: type_b.trim().to_string(),
                matched_rule: None,
            };
        };

        let a = rules.canonical(type_a);
        let b = rules.canonical(type_b);

        if a == b {
            return Compatibility {
                compatible: true,
                reason: format!("identical canonical type {a}"),
                canonical_a: a,
                canonical_b: b,
                matched_rule: None,
            };
        }

        let family_a = rules.substitutions(&a);
        let family_b = rules.substitutions(&b);
        for left in &family_a {
            for right in &family_b {
                if let Some(rule) = rules.forbidden_between(left, right) {
                    let via = if left == &a && right == &b {
                        String::new()
                    } else {
                        format!(" via {left}/{right}")
                    };
                    return Compatibility {
                        compatible: false,
                        reason: format!("forbidden merge {rule}{via}"),
                        canonical_a: a,
                        canonical_b: b,
                        matched_rule: Some(rule.clone()),
                    };
                }
            }
        }

        Compatibility {
            reason: format!("no prohibition between {a} and {b}"),
            compatible: true,
            canonical_a: a,
            canonical_b: b,
            matched_rule: None,
        }
    }

    /// Hard gate: fail with [`OntologyError::TypeConflict`] when the types
    /// cannot be merged.
    pub fn check(
        &self,
        name: &str,
        existing_type: &str,
        new_type: &str,
    ) -> Result<Compatibility, OntologyError> {
        let result = self.compatible(existing_type, new_type);
        if result.compatible {
            Ok(result)
        } else {
            Err(OntologyError::TypeConflict {
                name: name.to_string(),
                existing_type: result.canonical_a,
                new_type: result.canonical_b,
                reason: result.reason,
            })
        }
    }
}
