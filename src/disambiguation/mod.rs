//! Context-aware entity disambiguation.
//!
//! Resolves each [`EntityMention`] to an existing node URI or mints a new one,
//! guarding against the Jaguar Problem: same-name entities whose types are a
//! forbidden-merge pair never share a URI. Every resolution appends one
//! immutable [`DisambiguationDecision`] to the audit ledger.
//!
//! Outcomes:
//!
//! 1. **new**: no existing candidate; deterministic URI from name + type
//! 2. **exact-merge**: exactly one type-compatible candidate
//! 3. **context-disambiguated**: graph neighbors corroborate exactly one
//!    compatible candidate
//! 4. **unique-uri**: none of the above; mint `{base}-{n}`

pub mod service;
pub mod strategy;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

pub use service::{DisambiguationService, Resolution};
pub use strategy::{
    AnyOf, CoOccurrence, CorroborationContext, CorroborationStrategy, ExpectedNeighborTypes,
    NeighborInfo,
};

/// A raw entity mention from the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    pub name: String,
    pub declared_type: String,
    /// Reference to the source text the mention came from.
    #[serde(default)]
    pub source_ref: Option<String>,
    /// Names co-occurring with the mention in its source text.
    #[serde(default)]
    pub context: Vec<String>,
}

impl EntityMention {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            source_ref: None,
            context: Vec::new(),
        }
    }

    pub fn with_source(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = Some(source_ref.into());
        self
    }

    pub fn with_context<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.extend(terms.into_iter().map(Into::into));
        self
    }
}

/// How a mention was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionMethod {
    New,
    ExactMerge,
    ContextDisambiguated,
    UniqueUri,
}

impl ResolutionMethod {
    /// Whether this outcome created a node rather than reusing one.
    pub fn mints(self) -> bool {
        matches!(self, Self::New | Self::UniqueUri)
    }
}

impl std::fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::ExactMerge => write!(f, "exact-merge"),
            Self::ContextDisambiguated => write!(f, "context-disambiguated"),
            Self::UniqueUri => write!(f, "unique-uri"),
        }
    }
}

/// An existing entity considered while resolving a mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictCandidate {
    pub uri: String,
    pub entity_type: String,
    /// Whether its type may merge with the mention's type.
    pub compatible: bool,
    /// Compatibility reason from the type checker.
    pub reason: String,
    /// Neighbors corroborating the mention (0 when context was not consulted).
    pub corroboration: usize,
}

/// Immutable audit record of one resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisambiguationDecision {
    pub mention: EntityMention,
    pub normalized_name: String,
    pub canonical_type: String,
    pub resolved_uri: String,
    pub confidence: f32,
    pub method: ResolutionMethod,
    pub conflicts: Vec<ConflictCandidate>,
    pub reason: String,
    /// Context lookup failed and the decision fell back to minting.
    pub degraded: bool,
    pub timestamp: u64,
}

/// Normalize an entity name for lookup: NFKC, trimmed, lowercased, inner
/// whitespace collapsed to single spaces.
pub fn normalize_name(name: &str) -> String {
    let folded: String = name.nfkc().collect::<String>().to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

static NON_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("static slug pattern"));

/// URL-safe slug: runs of non-alphanumerics become one `-`.
pub fn slugify(text: &str) -> String {
    let lower = normalize_name(text);
    let slug = NON_SLUG.replace_all(&lower, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "_".to_string()
    } else {
        slug.to_string()
    }
}

/// Deterministic base URI for a normalized name and canonical type.
pub fn base_uri(namespace: &str, canonical_type: &str, normalized_name: &str) -> String {
    format!(
        "{}/{}/{}",
        namespace.trim_end_matches('/'),
        slugify(canonical_type),
        slugify(normalized_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_folds_case_width_and_spacing() {
        assert_eq!(normalize_name("  Jaguar   Cars "), "jaguar cars");
        // Fullwidth letters fold under NFKC.
        assert_eq!(normalize_name("ＪＡＧＵＡＲ"), "jaguar");
    }

    #[test]
    fn slugs_are_url_safe() {
        assert_eq!(slugify("Jaguar Land-Rover, Ltd."), "jaguar-land-rover-ltd");
        assert_eq!(slugify("Zürich"), "zürich");
        assert_eq!(slugify("!!!"), "_");
    }

    #[test]
    fn base_uri_combines_type_and_name() {
        assert_eq!(
            base_uri("kg://entity/", "Company", "jaguar"),
            "kg://entity/company/jaguar"
        );
    }

    #[test]
    fn method_tags() {
        assert_eq!(ResolutionMethod::ContextDisambiguated.to_string(), "context-disambiguated");
        assert!(ResolutionMethod::UniqueUri.mints());
        assert!(!ResolutionMethod::ExactMerge.mints());
    }
}
