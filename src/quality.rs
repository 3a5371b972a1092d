//! MINE graph quality score.
//!
//! Three components, each in [0, 1]:
//!
//! - **retention** (weight 0.4): how much of the source text survives in the
//!   graph, as the mean cosine similarity between each source text and its
//!   graph reconstruction under the injected embeddings provider
//! - **clustering** (weight 0.3): the share of distinct entity names not
//!   caught in an unresolved Jaguar problem
//! - **connectivity** (weight 0.3): largest connected component over node count
//!
//! A component that cannot be computed scores 0 and is flagged rather than
//! aborting the whole evaluation.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deadline::{CallFailure, run_with_timeout};
use crate::disambiguation::{DisambiguationDecision, normalize_name};
use crate::embed::{EmbeddingProvider, cosine_similarity};
use crate::error::EmbedError;
use crate::graph::components;
use crate::graph::matrix::{self, GraphMatrices};
use crate::graph::{Entity, GraphSnapshot, Relationship, SnapshotIndex};
use crate::ontology::{TypeChecker, TypeRuleSet};

pub const RETENTION_WEIGHT: f64 = 0.4;
pub const CLUSTERING_WEIGHT: f64 = 0.3;
pub const CONNECTIVITY_WEIGHT: f64 = 0.3;

/// A source text and the text reconstructed from the graph for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPair {
    pub source: String,
    pub reconstructed: String,
}

impl TextPair {
    pub fn new(source: impl Into<String>, reconstructed: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            reconstructed: reconstructed.into(),
        }
    }
}

/// A source text and the node URIs extracted from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceText {
    pub text: String,
    #[serde(default)]
    pub uris: Vec<String>,
}

/// One name whose entities carry incompatible types with no acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JaguarProblem {
    /// Normalized name.
    pub name: String,
    pub types: Vec<String>,
    pub uris: Vec<String>,
}

/// Letter grade of a total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    F,
}

impl Grade {
    /// `> 0.75` A, `[0.60, 0.75]` B, `[0.40, 0.60)` C, below F.
    pub fn from_total(total: f64) -> Self {
        if total > 0.75 {
            Self::A
        } else if total >= 0.60 {
            Self::B
        } else if total >= 0.40 {
            Self::C
        } else {
            Self::F
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::F => "F",
        };
        write!(f, "{s}")
    }
}

/// The combined score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MineScore {
    pub retention: f64,
    pub clustering: f64,
    pub connectivity: f64,
    pub total: f64,
    pub grade: Grade,
    pub retention_available: bool,
    pub connectivity_available: bool,
    pub distinct_names: usize,
    pub jaguar_problems: Vec<JaguarProblem>,
    /// Why a component scored 0 or was skipped.
    pub notes: Vec<String>,
}

impl MineScore {
    fn combine(
        retention: f64,
        clustering: f64,
        connectivity: f64,
    ) -> (f64, f64, f64, f64, Grade) {
        let r = retention.clamp(0.0, 1.0);
        let c = clustering.clamp(0.0, 1.0);
        let k = connectivity.clamp(0.0, 1.0);
        let total = RETENTION_WEIGHT * r + CLUSTERING_WEIGHT * c + CONNECTIVITY_WEIGHT * k;
        (r, c, k, total, Grade::from_total(total))
    }
}

/// Audit-derived inputs for the clustering component.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityInputs<'a> {
    pub corpus: &'a [TextPair],
    pub decisions: &'a [DisambiguationDecision],
    /// Normalized names whose conflicts a curator acknowledged.
    pub acknowledged: Option<&'a HashSet<String>>,
    pub rules: Option<&'a TypeRuleSet>,
}

/// Evaluator over an injected embeddings provider.
pub struct QualityEvaluator {
    provider: Arc<dyn EmbeddingProvider>,
    embed_timeout: Duration,
}

impl std::fmt::Debug for QualityEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityEvaluator")
            .field("embed_timeout", &self.embed_timeout)
            .finish_non_exhaustive()
    }
}

impl QualityEvaluator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, embed_timeout: Duration) -> Self {
        Self {
            provider,
            embed_timeout,
        }
    }

    /// Score a prebuilt graph. `entity_names` are the display names of its nodes.
    pub fn evaluate(
        &self,
        graph: &GraphMatrices,
        entity_names: &[&str],
        inputs: &QualityInputs<'_>,
    ) -> MineScore {
        let mut notes = Vec::new();

        let (retention, retention_available) = match self.retention(inputs.corpus) {
            Ok(score) => (score, true),
            Err(reason) => {
                tracing::warn!(reason = %reason, "retention unavailable");
                notes.push(format!("retention unavailable: {reason}"));
                (0.0, false)
            }
        };

        let (clustering, distinct_names, jaguar_problems) = clustering(entity_names, inputs);
        if distinct_names == 0 {
            notes.push("clustering: no entity names; scored as conflict-free".into());
        }

        let n = graph.node_count();
        let (connectivity, connectivity_available) = if n == 0 {
            notes.push("connectivity unavailable: empty graph".into());
            (0.0, false)
        } else {
            let comps = components::label(graph);
            (comps.largest() as f64 / n as f64, true)
        };

        let (retention, clustering, connectivity, total, grade) =
            MineScore::combine(retention, clustering, connectivity);
        tracing::info!(
            retention,
            clustering,
            connectivity,
            total,
            grade = %grade,
            jaguar_problems = jaguar_problems.len(),
            "quality evaluated"
        );
        MineScore {
            retention,
            clustering,
            connectivity,
            total,
            grade,
            retention_available,
            connectivity_available,
            distinct_names,
            jaguar_problems,
            notes,
        }
    }

    /// Build the graph from entity and relationship lists, then score it.
    pub fn evaluate_lists(
        &self,
        entities: &[Entity],
        relationships: &[Relationship],
        inputs: &QualityInputs<'_>,
    ) -> MineScore {
        let graph = matrix::build(entities, relationships);
        let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        self.evaluate(&graph, &names, inputs)
    }

    /// Mean clamped cosine similarity over the corpus.
    fn retention(&self, corpus: &[TextPair]) -> Result<f64, String> {
        if corpus.is_empty() {
            return Err("empty corpus".into());
        }
        let mut sum = 0.0;
        for pair in corpus {
            let provider = Arc::clone(&self.provider);
            let source = pair.source.clone();
            let reconstructed = pair.reconstructed.clone();
            let outcome = run_with_timeout(self.embed_timeout, move || {
                let a = provider.embed(&source)?;
                let b = provider.embed(&reconstructed)?;
                Ok::<_, EmbedError>(cosine_similarity(&a, &b))
            });
            let similarity = match outcome {
                Ok(Ok(s)) => s,
                Ok(Err(EmbedError::EmptyText)) => 0.0,
                Ok(Err(e)) => return Err(e.to_string()),
                Err(CallFailure::TimedOut) => {
                    return Err(EmbedError::Timeout {
                        timeout_ms: self.embed_timeout.as_millis() as u64,
                    }
                    .to_string());
                }
                Err(CallFailure::Panicked) => return Err("embeddings provider panicked".into()),
            };
            sum += f64::from(similarity).clamp(0.0, 1.0);
        }
        Ok(sum / corpus.len() as f64)
    }
}

/// Clustering score, distinct-name count and unresolved conflicts.
fn clustering(entity_names: &[&str], inputs: &QualityInputs<'_>) -> (f64, usize, Vec<JaguarProblem>) {
    let mut names: BTreeSet<String> = entity_names.iter().map(|n| normalize_name(n)).collect();
    names.extend(inputs.decisions.iter().map(|d| d.normalized_name.clone()));
    names.remove("");

    let problems = jaguar_problems(inputs);
    let distinct = names.len();
    let score = if distinct == 0 {
        1.0
    } else {
        1.0 - problems.len() as f64 / distinct as f64
    };
    (score, distinct, problems)
}

/// Names whose decisions put incompatible types on distinct URIs, minus the
/// acknowledged ones.
pub fn jaguar_problems(inputs: &QualityInputs<'_>) -> Vec<JaguarProblem> {
    let checker = match inputs.rules {
        Some(rules) => TypeChecker::new(Arc::new(rules.clone())),
        None => TypeChecker::unloaded(),
    };

    // name → uri → type (first decision wins)
    let mut by_name: BTreeMap<&str, BTreeMap<&str, &str>> = BTreeMap::new();
    for d in inputs.decisions {
        by_name
            .entry(d.normalized_name.as_str())
            .or_default()
            .entry(d.resolved_uri.as_str())
            .or_insert(d.canonical_type.as_str());
    }

    let mut problems = Vec::new();
    for (name, uris) in by_name {
        if inputs.acknowledged.is_some_and(|ack| ack.contains(name)) {
            continue;
        }
        let entries: Vec<(&str, &str)> = uris.into_iter().collect();
        let mut types = BTreeSet::new();
        let mut involved = BTreeSet::new();
        for (i, (uri_a, type_a)) in entries.iter().enumerate() {
            for (uri_b, type_b) in &entries[i + 1..] {
                if type_a != type_b && !checker.compatible(type_a, type_b).compatible {
                    types.insert(type_a.to_string());
                    types.insert(type_b.to_string());
                    involved.insert(uri_a.to_string());
                    involved.insert(uri_b.to_string());
                }
            }
        }
        if types.len() >= 2 {
            problems.push(JaguarProblem {
                name: name.to_string(),
                types: types.into_iter().collect(),
                uris: involved.into_iter().collect(),
            });
        }
    }
    problems
}

/// Render the graph neighborhood of `uris` as plain sentences.
pub fn reconstruct_text(snapshot: &GraphSnapshot, uris: &[String]) -> String {
    reconstruct_text_indexed(&snapshot.index(), uris)
}

/// [`reconstruct_text`] over a prebuilt index, for rendering many texts from
/// one snapshot.
pub fn reconstruct_text_indexed(index: &SnapshotIndex<'_>, uris: &[String]) -> String {
    let name_of = |uri: &str| -> String {
        index
            .entity(uri)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| uri.to_string())
    };

    let mut sentences = Vec::new();
    for uri in uris {
        if let Some(entity) = index.entity(uri) {
            sentences.push(format!("{} is a {}.", entity.name, entity.entity_type));
        }
    }
    for rel in index.relationships_touching(uris.iter().map(String::as_str)) {
        let verb = rel.relation.replace('_', " ").to_lowercase();
        sentences.push(format!("{} {verb} {}.", name_of(&rel.source), name_of(&rel.target)));
    }
    sentences.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disambiguation::{EntityMention, ResolutionMethod};
    use crate::embed::HashingEmbedder;

    fn evaluator() -> QualityEvaluator {
        QualityEvaluator::new(Arc::new(HashingEmbedder::default()), Duration::from_secs(2))
    }

    fn rules() -> TypeRuleSet {
        TypeRuleSet::builder()
            .forbid_merge("Animal", "Company", "organisms are not legal entities")
            .build()
    }

    fn decision(name: &str, ty: &str, uri: &str) -> DisambiguationDecision {
        DisambiguationDecision {
            mention: EntityMention::new(name, ty),
            normalized_name: normalize_name(name),
            canonical_type: ty.into(),
            resolved_uri: uri.into(),
            confidence: 1.0,
            method: ResolutionMethod::New,
            conflicts: vec![],
            reason: String::new(),
            degraded: false,
            timestamp: 0,
        }
    }

    fn entities(names: &[&str]) -> Vec<Entity> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| Entity::new(format!("kg://{i}"), *n, "Thing"))
            .collect()
    }

    struct Failing;
    impl EmbeddingProvider for Failing {
        fn embed(&self, _text: &str) -> crate::embed::EmbedResult<Vec<f32>> {
            Err(EmbedError::Unavailable {
                message: "offline".into(),
            })
        }
    }

    #[test]
    fn jaguar_conflict_penalizes_clustering_once() {
        let rules = rules();
        let decisions = vec![
            decision("Jaguar", "Animal", "kg://animal/jaguar"),
            decision("Jaguar", "Company", "kg://company/jaguar-1"),
            decision("Puma", "Animal", "kg://animal/puma"),
            decision("Ocelot", "Animal", "kg://animal/ocelot"),
        ];
        let inputs = QualityInputs {
            decisions: &decisions,
            rules: Some(&rules),
            ..Default::default()
        };
        let ents = entities(&["Jaguar", "Jaguar", "Puma", "Ocelot"]);
        let score = evaluator().evaluate_lists(&ents, &[], &inputs);
        assert_eq!(score.distinct_names, 3);
        assert_eq!(score.jaguar_problems.len(), 1);
        assert!((score.clustering - (1.0 - 1.0 / 3.0)).abs() < 1e-12);
        let p = &score.jaguar_problems[0];
        assert_eq!(p.name, "jaguar");
        assert_eq!(p.types, vec!["Animal", "Company"]);
        assert_eq!(p.uris.len(), 2);
    }

    #[test]
    fn acknowledged_conflicts_are_resolved() {
        let rules = rules();
        let decisions = vec![
            decision("Jaguar", "Animal", "kg://a"),
            decision("Jaguar", "Company", "kg://b"),
        ];
        let ack = HashSet::from(["jaguar".to_string()]);
        let inputs = QualityInputs {
            decisions: &decisions,
            rules: Some(&rules),
            acknowledged: Some(&ack),
            ..Default::default()
        };
        assert!(jaguar_problems(&inputs).is_empty());
    }

    #[test]
    fn compatible_types_are_not_a_conflict() {
        let rules = rules();
        let decisions = vec![
            decision("Apple", "Company", "kg://a"),
            decision("Apple", "Brand", "kg://b"),
        ];
        let inputs = QualityInputs {
            decisions: &decisions,
            rules: Some(&rules),
            ..Default::default()
        };
        assert!(jaguar_problems(&inputs).is_empty());
    }

    #[test]
    fn empty_corpus_marks_retention_unavailable() {
        let score = evaluator().evaluate_lists(&entities(&["a"]), &[], &QualityInputs::default());
        assert_eq!(score.retention, 0.0);
        assert!(!score.retention_available);
        assert!(score.notes.iter().any(|n| n.contains("empty corpus")));
    }

    #[test]
    fn provider_failure_marks_retention_unavailable() {
        let ev = QualityEvaluator::new(Arc::new(Failing), Duration::from_secs(1));
        let corpus = vec![TextPair::new("jaguar hunts", "jaguar hunts")];
        let inputs = QualityInputs {
            corpus: &corpus,
            ..Default::default()
        };
        let score = ev.evaluate_lists(&entities(&["a"]), &[], &inputs);
        assert!(!score.retention_available);
        assert!(score.notes[0].contains("offline"));
        assert_eq!(score.connectivity, 1.0);
    }

    #[test]
    fn identical_texts_retain_fully() {
        let corpus = vec![
            TextPair::new("Aspirin treats headache.", "aspirin treats headache"),
            TextPair::new("Jaguar lives in the Amazon.", "Jaguar lives in the Amazon"),
        ];
        let inputs = QualityInputs {
            corpus: &corpus,
            ..Default::default()
        };
        let score = evaluator().evaluate_lists(&entities(&["a"]), &[], &inputs);
        assert!(score.retention_available);
        assert!((score.retention - 1.0).abs() < 1e-5);
    }

    #[test]
    fn connectivity_uses_largest_component() {
        let ents = entities(&["a", "b", "c", "d"]);
        let rels = vec![
            Relationship::new("kg://0", "kg://1", "R"),
            Relationship::new("kg://1", "kg://2", "R"),
        ];
        let score = evaluator().evaluate_lists(&ents, &rels, &QualityInputs::default());
        assert!((score.connectivity - 0.75).abs() < 1e-12);
    }

    #[test]
    fn empty_graph_flags_connectivity() {
        let score = evaluator().evaluate_lists(&[], &[], &QualityInputs::default());
        assert_eq!(score.connectivity, 0.0);
        assert!(!score.connectivity_available);
        assert_eq!(score.grade, Grade::F);
    }

    #[test]
    fn total_matches_weights() {
        let corpus = vec![TextPair::new("jaguar hunts capybara", "jaguar hunts")];
        let ents = entities(&["a", "b", "c"]);
        let rels = vec![Relationship::new("kg://0", "kg://1", "R")];
        let inputs = QualityInputs {
            corpus: &corpus,
            ..Default::default()
        };
        let s = evaluator().evaluate_lists(&ents, &rels, &inputs);
        for v in [s.retention, s.clustering, s.connectivity, s.total] {
            assert!((0.0..=1.0).contains(&v));
        }
        let expected = 0.4 * s.retention + 0.3 * s.clustering + 0.3 * s.connectivity;
        assert!((s.total - expected).abs() < 1e-12);
    }

    #[test]
    fn grade_bands() {
        assert_eq!(Grade::from_total(0.76), Grade::A);
        assert_eq!(Grade::from_total(0.75), Grade::B);
        assert_eq!(Grade::from_total(0.60), Grade::B);
        assert_eq!(Grade::from_total(0.59), Grade::C);
        assert_eq!(Grade::from_total(0.40), Grade::C);
        assert_eq!(Grade::from_total(0.39), Grade::F);
    }

    #[test]
    fn reconstruction_renders_neighborhood() {
        let snapshot = GraphSnapshot::new(
            vec![
                Entity::new("kg://aspirin", "Aspirin", "Medication"),
                Entity::new("kg://headache", "Headache", "Disease"),
            ],
            vec![Relationship::new("kg://aspirin", "kg://headache", "TREATS")],
        );
        let text = reconstruct_text(&snapshot, &["kg://aspirin".to_string()]);
        assert_eq!(text, "Aspirin is a Medication. Aspirin treats Headache.");
    }
}
