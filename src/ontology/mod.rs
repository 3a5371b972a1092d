//! Ontology: the immutable type rule set and the checks built on it.
//!
//! - [`TypeRuleSet`]: aliases, hierarchy, forbidden merges, compliance rules
//! - [`TypeChecker`]: pure compatibility gate used before any merge
//! - [`OntologyHandle`]: the swappable reference used for hot reload

pub mod compat;
pub mod loader;
pub mod rules;

pub use compat::{Compatibility, TypeChecker};
pub use loader::{OntologyFile, OntologyHandle};
pub use rules::{ComplianceRule, ForbiddenMerge, RuleSetBuilder, TargetRule, TypeRuleSet};
