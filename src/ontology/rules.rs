//! The immutable ontology rule set.
//!
//! A [`TypeRuleSet`] is built once (from TOML via [`super::loader`] or with a
//! [`RuleSetBuilder`]) and shared behind an `Arc`. Every type it stores is
//! already resolved through the alias map, so lookups only canonicalize the
//! caller's input.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

/// A forbidden-merge rule: entities of these two types must never share a URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForbiddenMerge {
    pub type_a: String,
    pub type_b: String,
    pub reason: String,
}

impl std::fmt::Display for ForbiddenMerge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ⟂ {}", self.type_a, self.type_b)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

/// Allowed/forbidden target types for one relation label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRule {
    #[serde(default)]
    pub allowed: BTreeSet<String>,
    #[serde(default)]
    pub forbidden: BTreeSet<String>,
}

/// Compliance rule for one source type.
///
/// `relations` refines the type-level lists for specific relation labels
/// (keys are upper-cased).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRule {
    #[serde(default)]
    pub allowed: BTreeSet<String>,
    #[serde(default)]
    pub forbidden: BTreeSet<String>,
    #[serde(default)]
    pub relations: BTreeMap<String, TargetRule>,
}

impl ComplianceRule {
    /// The target rule that applies to `relation`: the relation-specific
    /// refinement if one exists, otherwise the type-level lists.
    pub fn targets_for(&self, relation: &str) -> TargetRule {
        match self.relations.get(&relation.trim().to_uppercase()) {
            Some(rule) => rule.clone(),
            None => TargetRule {
                allowed: self.allowed.clone(),
                forbidden: self.forbidden.clone(),
            },
        }
    }
}

/// Immutable ontology configuration: aliases, hierarchy, forbidden merges,
/// compliance rules and expected neighbor types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeRuleSet {
    /// lowercase alias → canonical type.
    aliases: HashMap<String, String>,
    /// lowercase type → the ontology's spelling of it.
    known: HashMap<String, String>,
    /// child → direct parents.
    parents: HashMap<String, Vec<String>>,
    /// parent → direct children.
    children: HashMap<String, Vec<String>>,
    forbidden: Vec<ForbiddenMerge>,
    /// Unordered pair (stored sorted) → index into `forbidden`.
    forbidden_index: HashMap<(String, String), usize>,
    compliance: HashMap<String, ComplianceRule>,
    expected_neighbors: HashMap<String, BTreeSet<String>>,
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl TypeRuleSet {
    /// Start building a rule set.
    pub fn builder() -> RuleSetBuilder {
        RuleSetBuilder::default()
    }

    /// Resolve a declared type to its canonical form.
    ///
    /// Aliases win over known types; unknown types are returned trimmed.
    pub fn canonical(&self, ty: &str) -> String {
        let trimmed = ty.trim();
        let lower = trimmed.to_lowercase();
        if let Some(canonical) = self.aliases.get(&lower) {
            return canonical.clone();
        }
        if let Some(spelling) = self.known.get(&lower) {
            return spelling.clone();
        }
        trimmed.to_string()
    }

    /// Whether the type (after alias resolution) appears anywhere in the ontology.
    pub fn is_known(&self, ty: &str) -> bool {
        let canonical = self.canonical(ty);
        self.known.contains_key(&canonical.to_lowercase())
    }

    /// All transitive ancestors of a canonical type, nearest first.
    pub fn ancestors(&self, ty: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(ty);
        queue.push_back(ty);
        while let Some(current) = queue.pop_front() {
            if let Some(parents) = self.parents.get(current) {
                for parent in parents {
                    if visited.insert(parent.as_str()) {
                        out.push(parent.clone());
                        queue.push_back(parent.as_str());
                    }
                }
            }
        }
        out
    }

    /// All transitive descendants of a canonical type, nearest first.
    pub fn descendants(&self, ty: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(ty);
        queue.push_back(ty);
        while let Some(current) = queue.pop_front() {
            if let Some(children) = self.children.get(current) {
                for child in children {
                    if visited.insert(child.as_str()) {
                        out.push(child.clone());
                        queue.push_back(child.as_str());
                    }
                }
            }
        }
        out
    }

    /// The type itself followed by its ancestors.
    pub fn lineage(&self, ty: &str) -> Vec<String> {
        let mut out = vec![ty.to_string()];
        out.extend(self.ancestors(ty));
        out
    }

    /// Every type a merge check may substitute for `ty`: the type, its
    /// ancestors, then its descendants.
    pub fn substitutions(&self, ty: &str) -> Vec<String> {
        let mut out = self.lineage(ty);
        for child in self.descendants(ty) {
            if !out.contains(&child) {
                out.push(child);
            }
        }
        out
    }

    /// Hierarchy roots reachable from `ty` (the type itself if it has no parents).
    pub fn roots(&self, ty: &str) -> BTreeSet<String> {
        self.lineage(ty)
            .into_iter()
            .filter(|t| self.parents.get(t).is_none_or(|p| p.is_empty()))
            .collect()
    }

    /// Whether `ty` equals `ancestor` or descends from it.
    pub fn is_a(&self, ty: &str, ancestor: &str) -> bool {
        ty == ancestor || self.ancestors(ty).iter().any(|a| a == ancestor)
    }

    /// Direct children of a type in the hierarchy.
    pub fn children_of(&self, ty: &str) -> &[String] {
        self.children.get(ty).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Look up a forbidden-merge rule for an unordered canonical pair.
    pub fn forbidden_between(&self, a: &str, b: &str) -> Option<&ForbiddenMerge> {
        self.forbidden_index
            .get(&pair_key(a, b))
            .map(|&idx| &self.forbidden[idx])
    }

    /// All forbidden-merge rules.
    pub fn forbidden_merges(&self) -> &[ForbiddenMerge] {
        &self.forbidden
    }

    /// The compliance rule for a canonical source type, or its nearest ancestor.
    ///
    /// Returns the type the rule was found on alongside the rule.
    pub fn compliance_rule(&self, source: &str) -> Option<(String, &ComplianceRule)> {
        self.lineage(source)
            .into_iter()
            .find_map(|t| self.compliance.get(&t).map(|rule| (t, rule)))
    }

    /// Neighbor types expected around an entity of the given canonical type,
    /// merged along its lineage.
    pub fn expected_neighbors(&self, ty: &str) -> BTreeSet<String> {
        self.lineage(ty)
            .iter()
            .filter_map(|t| self.expected_neighbors.get(t))
            .flat_map(|set| set.iter().cloned())
            .collect()
    }

    /// Number of forbidden-merge rules.
    pub fn forbidden_count(&self) -> usize {
        self.forbidden.len()
    }

    /// Number of source types with a compliance rule.
    pub fn compliance_count(&self) -> usize {
        self.compliance.len()
    }
}

/// Incremental builder for [`TypeRuleSet`].
///
/// Types are canonicalized through the alias map in [`build`](Self::build),
/// so aliases may be declared in any order.
#[derive(Debug, Clone, Default)]
pub struct RuleSetBuilder {
    aliases: Vec<(String, String)>,
    subtypes: Vec<(String, String)>,
    forbidden: Vec<ForbiddenMerge>,
    compliance: Vec<(String, ComplianceRule)>,
    expected: Vec<(String, Vec<String>)>,
}

impl RuleSetBuilder {
    /// Map `alias` onto `canonical`.
    pub fn alias(mut self, alias: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases.push((alias.into(), canonical.into()));
        self
    }

    /// Declare `child` as a subtype of `parent`.
    pub fn subtype(mut self, parent: impl Into<String>, child: impl Into<String>) -> Self {
        self.subtypes.push((parent.into(), child.into()));
        self
    }

    /// Forbid merging entities of the two types.
    pub fn forbid_merge(
        mut self,
        type_a: impl Into<String>,
        type_b: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.forbidden.push(ForbiddenMerge {
            type_a: type_a.into(),
            type_b: type_b.into(),
            reason: reason.into(),
        });
        self
    }

    /// Attach a compliance rule to a source type.
    pub fn compliance(mut self, source: impl Into<String>, rule: ComplianceRule) -> Self {
        self.compliance.push((source.into(), rule));
        self
    }

    /// Declare the neighbor types that corroborate an entity of type `ty`.
    pub fn expect_neighbors<I, S>(mut self, ty: impl Into<String>, neighbors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected
            .push((ty.into(), neighbors.into_iter().map(Into::into).collect()));
        self
    }

    /// Freeze the builder into an immutable rule set.
    pub fn build(self) -> TypeRuleSet {
        let mut rules = TypeRuleSet::default();

        for (alias, canonical) in &self.aliases {
            let canonical = canonical.trim().to_string();
            rules.aliases.insert(alias.trim().to_lowercase(), canonical.clone());
            rules.known.insert(canonical.to_lowercase(), canonical);
        }

        let canon = |rules: &mut TypeRuleSet, ty: &str| -> String {
            let c = rules.canonical(ty);
            rules.known.entry(c.to_lowercase()).or_insert_with(|| c.clone());
            c
        };

        for (parent, child) in &self.subtypes {
            let parent = canon(&mut rules, parent);
            let child = canon(&mut rules, child);
            if parent == child {
                continue;
            }
            let entry = rules.parents.entry(child.clone()).or_default();
            if !entry.contains(&parent) {
                entry.push(parent.clone());
            }
            let entry = rules.children.entry(parent).or_default();
            if !entry.contains(&child) {
                entry.push(child);
            }
        }

        for rule in &self.forbidden {
            let a = canon(&mut rules, &rule.type_a);
            let b = canon(&mut rules, &rule.type_b);
            let key = pair_key(&a, &b);
            if rules.forbidden_index.contains_key(&key) {
                continue;
            }
            rules.forbidden_index.insert(key, rules.forbidden.len());
            rules.forbidden.push(ForbiddenMerge {
                type_a: a,
                type_b: b,
                reason: rule.reason.clone(),
            });
        }

        for (source, rule) in &self.compliance {
            let source = canon(&mut rules, source);
            let mut canonical_set = |set: &BTreeSet<String>| -> BTreeSet<String> {
                set.iter().map(|t| canon(&mut rules, t)).collect()
            };
            let allowed = canonical_set(&rule.allowed);
            let forbidden = canonical_set(&rule.forbidden);
            let mut relations = BTreeMap::new();
            for (label, target) in &rule.relations {
                let target = TargetRule {
                    allowed: canonical_set(&target.allowed),
                    forbidden: canonical_set(&target.forbidden),
                };
                relations.insert(label.trim().to_uppercase(), target);
            }
            rules.compliance.insert(
                source,
                ComplianceRule {
                    allowed,
                    forbidden,
                    relations,
                },
            );
        }

        for (ty, neighbors) in &self.expected {
            let ty = canon(&mut rules, ty);
            let set: BTreeSet<String> = neighbors.iter().map(|n| canon(&mut rules, n)).collect();
            rules.expected_neighbors.entry(ty).or_default().extend(set);
        }

        rules
    }
}
