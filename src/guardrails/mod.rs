//! Ontology compliance guardrails for relationship candidates.
//!
//! Validation is a pure function of the rule set and the candidate's endpoint
//! types, so it is safe to call from any number of threads. Violations are
//! graded, recorded in a [`ViolationRegistry`] and never silently dropped;
//! whether a critical violation blocks the edge is the caller's policy.

pub mod registry;

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ontology::{OntologyHandle, TypeRuleSet};

pub use registry::{Violation, ViolationRegistry};

/// Ordinal rank of a violation: `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// What to do when no compliance rule covers the source type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingRulePolicy {
    /// Record a LOW "unspecified" finding and let the edge through.
    #[default]
    FailOpen,
    /// Record a HIGH finding.
    FailClosed,
}

/// Who overrode a decision, why and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideInfo {
    pub actor: String,
    pub reason: String,
    pub timestamp: u64,
}

/// One graded compliance problem with a relationship candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub reason: String,
    /// Canonical source type.
    pub source_type: String,
    /// Canonical target type.
    pub target_type: String,
    pub relation: String,
}

/// Result of validating one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub is_compliant: bool,
    pub violations: Vec<Finding>,
}

impl ComplianceReport {
    fn from_findings(violations: Vec<Finding>) -> Self {
        Self {
            is_compliant: violations.is_empty(),
            violations,
        }
    }

    /// Highest severity among the findings.
    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|f| f.severity).max()
    }

    pub fn is_critical(&self) -> bool {
        self.max_severity() == Some(Severity::Critical)
    }
}

/// One entry of a batch validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedCandidate {
    pub source_type: String,
    pub target_type: String,
    pub relation: String,
}

impl TypedCandidate {
    pub fn new(
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            target_type: target_type.into(),
            relation: relation.into(),
        }
    }
}

/// Aggregate over a batch of candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// `1 − violating / total`; 1.0 for an empty batch.
    pub compliance_score: f64,
    pub total: usize,
    /// Candidates with at least one finding.
    pub violating: usize,
    /// Findings per severity (every severity present, possibly zero).
    pub by_severity: BTreeMap<Severity, usize>,
    /// Per-candidate reports, in input order.
    pub reports: Vec<ComplianceReport>,
}

/// Relationship validator over the current ontology snapshot.
#[derive(Debug, Clone)]
pub struct Guardrails {
    ontology: OntologyHandle,
    missing_rule: MissingRulePolicy,
}

impl Guardrails {
    pub fn new(ontology: OntologyHandle, missing_rule: MissingRulePolicy) -> Self {
        Self {
            ontology,
            missing_rule,
        }
    }

    /// Guardrails over a fixed rule set.
    pub fn from_rules(rules: TypeRuleSet, missing_rule: MissingRulePolicy) -> Self {
        Self::new(OntologyHandle::new(rules), missing_rule)
    }

    pub fn missing_rule_policy(&self) -> MissingRulePolicy {
        self.missing_rule
    }

    /// Validate a relationship between entities of the given types.
    pub fn validate(&self, source_type: &str, target_type: &str, relation: &str) -> ComplianceReport {
        let rules = self.ontology.snapshot();
        self.validate_with(rules.as_deref(), source_type, target_type, relation)
    }

    fn validate_with(
        &self,
        rules: Option<&TypeRuleSet>,
        source_type: &str,
        target_type: &str,
        relation: &str,
    ) -> ComplianceReport {
        let findings = match rules {
            Some(rules) => self.grade(rules, source_type, target_type, relation),
            None => vec![Finding {
                severity: self.missing_severity(),
                reason: "ontology ruleset not loaded".into(),
                source_type: source_type.trim().to_string(),
                target_type: target_type.trim().to_string(),
                relation: relation.to_string(),
            }],
        };
        for finding in &findings {
            if finding.severity == Severity::Critical {
                tracing::warn!(
                    source = %finding.source_type,
                    target = %finding.target_type,
                    relation,
                    reason = %finding.reason,
                    "critical compliance violation"
                );
            }
        }
        ComplianceReport::from_findings(findings)
    }

    /// Validate many candidates in parallel against one rule-set snapshot.
    pub fn validate_batch(&self, candidates: &[TypedCandidate]) -> BatchReport {
        let rules = self.ontology.snapshot();
        let reports: Vec<ComplianceReport> = candidates
            .par_iter()
            .map(|c| self.validate_with(rules.as_deref(), &c.source_type, &c.target_type, &c.relation))
            .collect();

        let mut by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        let mut violating = 0;
        for report in &reports {
            if !report.is_compliant {
                violating += 1;
            }
            for finding in &report.violations {
                *by_severity.entry(finding.severity).or_default() += 1;
            }
        }
        let total = reports.len();
        let compliance_score = if total == 0 {
            1.0
        } else {
            1.0 - violating as f64 / total as f64
        };
        BatchReport {
            compliance_score,
            total,
            violating,
            by_severity,
            reports,
        }
    }

    fn missing_severity(&self) -> Severity {
        match self.missing_rule {
            MissingRulePolicy::FailOpen => Severity::Low,
            MissingRulePolicy::FailClosed => Severity::High,
        }
    }

    fn grade(
        &self,
        rules: &TypeRuleSet,
        source_type: &str,
        target_type: &str,
        relation: &str,
    ) -> Vec<Finding> {
        let source = rules.canonical(source_type);
        let target = rules.canonical(target_type);
        let finding = |severity: Severity, reason: String| Finding {
            severity,
            reason,
            source_type: source.clone(),
            target_type: target.clone(),
            relation: relation.to_string(),
        };

        let Some((owner, rule)) = rules.compliance_rule(&source) else {
            return vec![finding(
                self.missing_severity(),
                format!("unspecified: no compliance rule for {source}"),
            )];
        };
        let targets = rule.targets_for(relation);
        let lineage = rules.lineage(&target);

        if let Some(hit) = lineage.iter().find(|t| targets.forbidden.contains(*t)) {
            let via = if hit == &target {
                String::new()
            } else {
                format!(" (via {hit})")
            };
            return vec![finding(
                Severity::Critical,
                format!("{target}{via} is a forbidden target of {owner} for {relation}"),
            )];
        }

        if targets.allowed.is_empty() || lineage.iter().any(|t| targets.allowed.contains(t)) {
            return Vec::new();
        }

        if !rules.is_known(&target) {
            return vec![finding(
                Severity::Low,
                format!("unspecified: {target} is not in the ontology"),
            )];
        }

        let target_roots = rules.roots(&target);
        let related = targets
            .allowed
            .iter()
            .any(|allowed| !rules.roots(allowed).is_disjoint(&target_roots));
        if related {
            vec![finding(
                Severity::Medium,
                format!("plausible but unusual: {target} is not an allowed target of {owner} for {relation}"),
            )]
        } else {
            vec![finding(
                Severity::High,
                format!("disjoint domain: {target} shares no hierarchy with the allowed targets of {owner}"),
            )]
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::ontology::ComplianceRule;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn guardrails() -> Guardrails {
        let rules = TypeRuleSet::builder()
            .subtype("Condition", "Disease")
            .subtype("Condition", "SideEffect")
            .subtype("Condition", "Symptom")
            .subtype("Microbe", "Bacterium")
            .subtype("Microbe", "Virus")
            .subtype("Software", "SoftwareBug")
            .subtype("Medication", "Antibiotic")
            .compliance(
                "Medication",
                ComplianceRule {
                    allowed: set(&["Disease", "Bacterium"]),
                    forbidden: set(&["SoftwareBug"]),
                    ..Default::default()
                },
            )
            .compliance(
                "Antibiotic",
                ComplianceRule {
                    allowed: set(&["Bacterium"]),
                    forbidden: set(&["Virus"]),
                    ..Default::default()
                },
            )
            .build();
        Guardrails::from_rules(rules, MissingRulePolicy::FailOpen)
    }

    #[test]
    fn forbidden_target_is_critical() {
        let report = guardrails().validate("Medication", "SoftwareBug", "CAUSES");
        assert!(!report.is_compliant);
        assert_eq!(report.max_severity(), Some(Severity::Critical));
    }

    #[test]
    fn antibiotic_treating_virus_is_critical() {
        let report = guardrails().validate("Antibiotic", "Virus", "TREATS");
        assert!(report.is_critical());
        assert!(report.violations[0].reason.contains("Virus"));
    }

    #[test]
    fn allowed_target_is_compliant() {
        let report = guardrails().validate("Medication", "Disease", "TREATS");
        assert!(report.is_compliant);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn sibling_of_allowed_target_is_medium() {
        let report = guardrails().validate("Medication", "Symptom", "TREATS");
        assert_eq!(report.max_severity(), Some(Severity::Medium));
    }

    #[test]
    fn unrelated_known_target_is_high() {
        let report = guardrails().validate("Antibiotic", "Software", "TREATS");
        assert_eq!(report.max_severity(), Some(Severity::High));
    }

    #[test]
    fn unknown_target_is_low() {
        let report = guardrails().validate("Medication", "Spaceship", "TREATS");
        assert_eq!(report.max_severity(), Some(Severity::Low));
    }

    #[test]
    fn missing_rule_follows_policy() {
        let open = guardrails().validate("Person", "Disease", "HAS");
        assert_eq!(open.max_severity(), Some(Severity::Low));

        let closed = Guardrails::from_rules(TypeRuleSet::default(), MissingRulePolicy::FailClosed)
            .validate("Person", "Disease", "HAS");
        assert_eq!(closed.max_severity(), Some(Severity::High));
    }

    #[test]
    fn relation_refinement_takes_precedence() {
        let mut rule = ComplianceRule {
            allowed: set(&["Disease"]),
            ..Default::default()
        };
        rule.relations.insert(
            "causes".into(),
            crate::ontology::TargetRule {
                allowed: set(&["SideEffect"]),
                forbidden: set(&["Disease"]),
            },
        );
        let g = Guardrails::from_rules(
            TypeRuleSet::builder()
                .subtype("Condition", "Disease")
                .subtype("Condition", "SideEffect")
                .compliance("Medication", rule)
                .build(),
            MissingRulePolicy::FailOpen,
        );
        assert!(g.validate("Medication", "SideEffect", "CAUSES").is_compliant);
        assert!(g.validate("Medication", "Disease", "causes").is_critical());
        assert!(g.validate("Medication", "Disease", "TREATS").is_compliant);
    }

    #[test]
    fn batch_score_and_counts() {
        let batch = guardrails().validate_batch(&[
            TypedCandidate::new("Medication", "Disease", "TREATS"),
            TypedCandidate::new("Medication", "SoftwareBug", "CAUSES"),
            TypedCandidate::new("Medication", "Bacterium", "TREATS"),
            TypedCandidate::new("Medication", "Symptom", "TREATS"),
        ]);
        assert_eq!(batch.total, 4);
        assert_eq!(batch.violating, 2);
        assert!((batch.compliance_score - 0.5).abs() < 1e-12);
        assert_eq!(batch.by_severity[&Severity::Critical], 1);
        assert_eq!(batch.by_severity[&Severity::Medium], 1);
        assert_eq!(batch.by_severity[&Severity::Low], 0);
    }

    #[test]
    fn empty_batch_is_fully_compliant() {
        let batch = guardrails().validate_batch(&[]);
        assert_eq!(batch.compliance_score, 1.0);
    }

    #[test]
    fn severity_order() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
    }
}
