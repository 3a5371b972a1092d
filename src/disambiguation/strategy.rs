//! Pluggable neighbor-corroboration strategies.
//!
//! When name lookup alone cannot pick a candidate, the service fetches each
//! candidate's one-hop neighbors and asks a [`CorroborationStrategy`] how many
//! of them support merging the mention into that candidate.

use std::collections::HashSet;

use crate::ontology::TypeRuleSet;

use super::{EntityMention, normalize_name};

/// What the service knows about one neighbor of a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborInfo {
    pub uri: String,
    pub name: Option<String>,
    /// Canonical type, when storage knows the node.
    pub entity_type: Option<String>,
}

/// Inputs to a corroboration score.
#[derive(Debug, Clone, Copy)]
pub struct CorroborationContext<'a> {
    pub mention: &'a EntityMention,
    /// Canonical form of the mention's declared type.
    pub mention_type: &'a str,
    pub candidate_uri: &'a str,
    pub candidate_type: &'a str,
    pub neighbors: &'a [NeighborInfo],
    pub rules: Option<&'a TypeRuleSet>,
}

/// Counts the neighbors of a candidate that corroborate a mention.
pub trait CorroborationStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn corroborating(&self, ctx: &CorroborationContext<'_>) -> usize;
}

/// Neighbors whose type (or an ancestor of it) is expected around entities of
/// the mention's declared type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpectedNeighborTypes;

impl CorroborationStrategy for ExpectedNeighborTypes {
    fn name(&self) -> &str {
        "expected-neighbor-types"
    }

    fn corroborating(&self, ctx: &CorroborationContext<'_>) -> usize {
        let Some(rules) = ctx.rules else {
            return 0;
        };
        let expected = rules.expected_neighbors(ctx.mention_type);
        if expected.is_empty() {
            return 0;
        }
        ctx.neighbors
            .iter()
            .filter_map(|n| n.entity_type.as_deref())
            .filter(|ty| rules.lineage(ty).iter().any(|t| expected.contains(t)))
            .count()
    }
}

/// Neighbors whose name matches one of the mention's context terms.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoOccurrence;

impl CorroborationStrategy for CoOccurrence {
    fn name(&self) -> &str {
        "co-occurrence"
    }

    fn corroborating(&self, ctx: &CorroborationContext<'_>) -> usize {
        if ctx.mention.context.is_empty() {
            return 0;
        }
        let terms: HashSet<String> = ctx.mention.context.iter().map(|t| normalize_name(t)).collect();
        ctx.neighbors
            .iter()
            .filter_map(|n| n.name.as_deref())
            .filter(|name| terms.contains(&normalize_name(name)))
            .count()
    }
}

/// Sum of several strategies.
pub struct AnyOf {
    strategies: Vec<Box<dyn CorroborationStrategy>>,
}

impl AnyOf {
    pub fn new(strategies: Vec<Box<dyn CorroborationStrategy>>) -> Self {
        Self { strategies }
    }
}

impl std::fmt::Debug for AnyOf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("AnyOf").field("strategies", &names).finish()
    }
}

impl CorroborationStrategy for AnyOf {
    fn name(&self) -> &str {
        "any-of"
    }

    fn corroborating(&self, ctx: &CorroborationContext<'_>) -> usize {
        self.strategies.iter().map(|s| s.corroborating(ctx)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> TypeRuleSet {
        TypeRuleSet::builder()
            .subtype("Person", "Executive")
            .expect_neighbors("Company", ["Person", "Product"])
            .expect_neighbors("Animal", ["Habitat", "Species"])
            .build()
    }

    fn neighbor(uri: &str, name: &str, ty: &str) -> NeighborInfo {
        NeighborInfo {
            uri: uri.into(),
            name: Some(name.into()),
            entity_type: Some(ty.into()),
        }
    }

    #[test]
    fn expected_types_count_through_hierarchy() {
        let rules = rules();
        let mention = EntityMention::new("Jaguar", "Company");
        let neighbors = vec![
            neighbor("kg://executive/ceo", "Adrian Mardell", "Executive"),
            neighbor("kg://product/f-type", "F-Type", "Product"),
            neighbor("kg://habitat/amazon", "Amazon", "Habitat"),
        ];
        let ctx = CorroborationContext {
            mention: &mention,
            mention_type: "Company",
            candidate_uri: "kg://company/jaguar",
            candidate_type: "Company",
            neighbors: &neighbors,
            rules: Some(&rules),
        };
        assert_eq!(ExpectedNeighborTypes.corroborating(&ctx), 2);
    }

    #[test]
    fn co_occurrence_matches_normalized_names() {
        let mention = EntityMention::new("Jaguar", "Animal").with_context(["  the AMAZON ", "river"]);
        let neighbors = vec![
            neighbor("kg://habitat/amazon", "The Amazon", "Habitat"),
            neighbor("kg://product/f-type", "F-Type", "Product"),
        ];
        let ctx = CorroborationContext {
            mention: &mention,
            mention_type: "Animal",
            candidate_uri: "kg://animal/jaguar",
            candidate_type: "Animal",
            neighbors: &neighbors,
            rules: None,
        };
        assert_eq!(CoOccurrence.corroborating(&ctx), 1);
        assert_eq!(ExpectedNeighborTypes.corroborating(&ctx), 0);
    }

    #[test]
    fn any_of_sums_strategies() {
        let rules = rules();
        let mention = EntityMention::new("Jaguar", "Animal").with_context(["Amazon"]);
        let neighbors = vec![neighbor("kg://habitat/amazon", "Amazon", "Habitat")];
        let ctx = CorroborationContext {
            mention: &mention,
            mention_type: "Animal",
            candidate_uri: "kg://animal/jaguar",
            candidate_type: "Animal",
            neighbors: &neighbors,
            rules: Some(&rules),
        };
        let both = AnyOf::new(vec![Box::new(ExpectedNeighborTypes), Box::new(CoOccurrence)]);
        assert_eq!(both.corroborating(&ctx), 2);
        assert_eq!(both.name(), "any-of");
    }
}
