//! Engine facade: owns and wires all ontoguard subsystems.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::audit::{
    AuditLedger, ConflictAcknowledgement, IntegrityReport, LedgerEvent, ReportBuilder, unix_now,
};
use crate::config::{CriticalPolicy, EngineConfig};
use crate::disambiguation::{DisambiguationService, EntityMention, Resolution, normalize_name};
use crate::embed::{EmbeddingProvider, HashingEmbedder};
use crate::error::{EngineError, OntoGuardResult, StorageError};
use crate::graph::matrix;
use crate::graph::spectral::{SpectralAnalyzer, SpectralReport};
use crate::graph::{RelationStatus, RelationshipCandidate};
use crate::guardrails::{ComplianceReport, Guardrails, OverrideInfo, Severity, Violation, ViolationRegistry};
use crate::ontology::{OntologyHandle, TypeChecker, TypeRuleSet};
use crate::quality::{MineScore, QualityEvaluator, QualityInputs, SourceText, TextPair, reconstruct_text_indexed};
use crate::store::{GraphStore, MemGraphStore};

/// Result of proposing one relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipOutcome {
    /// The candidate with its final status.
    pub candidate: RelationshipCandidate,
    pub report: ComplianceReport,
    /// Ids of the violations recorded for it.
    pub violation_ids: Vec<u64>,
}

impl RelationshipOutcome {
    pub fn is_committed(&self) -> bool {
        self.candidate.status == RelationStatus::Committed
    }
}

/// The ontoguard ingestion engine.
///
/// Owns the ontology handle, the audit ledger, the guardrails and violation
/// registry, the disambiguation service and the batch analyzers. Storage and
/// embeddings are injected.
pub struct Engine {
    config: EngineConfig,
    ontology: OntologyHandle,
    store: Arc<dyn GraphStore>,
    ledger: Arc<AuditLedger>,
    guardrails: Guardrails,
    violations: ViolationRegistry,
    disambiguation: DisambiguationService,
    quality: QualityEvaluator,
    spectral: SpectralAnalyzer,
    /// Critical violation id → the candidate it keeps pending.
    blocked: Mutex<BTreeMap<u64, RelationshipCandidate>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("ontology_loaded", &self.ontology.is_loaded())
            .field("ledger_entries", &self.ledger.len())
            .field("violations", &self.violations.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine over injected storage and embeddings.
    pub fn new(
        config: EngineConfig,
        ontology: OntologyHandle,
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> OntoGuardResult<Self> {
        config.validate()?;

        let ledger = match &config.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|_| EngineError::DataDir {
                    path: dir.display().to_string(),
                })?;
                AuditLedger::open(dir)?
            }
            None => AuditLedger::in_memory(),
        };
        let ledger = Arc::new(ledger);

        tracing::info!(
            namespace = %config.uri_namespace,
            ontology_loaded = ontology.is_loaded(),
            durable = config.data_dir.is_some(),
            critical_policy = ?config.critical_policy,
            "initializing ontoguard engine"
        );
        if !ontology.is_loaded() {
            tracing::warn!("no ontology loaded; every merge fails closed");
        }

        let disambiguation = DisambiguationService::new(
            ontology.clone(),
            Arc::clone(&store),
            Arc::clone(&ledger),
            config.uri_namespace.clone(),
        )
        .with_storage_timeout(config.storage_timeout());

        let engine = Self {
            guardrails: Guardrails::new(ontology.clone(), config.missing_rule_policy),
            violations: ViolationRegistry::starting_after(ledger.last_overridden_violation()),
            quality: QualityEvaluator::new(embedder, config.embed_timeout()),
            spectral: SpectralAnalyzer::new(config.spectral()),
            blocked: Mutex::new(BTreeMap::new()),
            disambiguation,
            ontology,
            store,
            ledger,
            config,
        };

        match engine.store.snapshot() {
            Ok(snapshot) => {
                engine.disambiguation.hydrate(&snapshot);
            }
            Err(e) => tracing::warn!(error = %e, "could not hydrate name index from storage"),
        }
        Ok(engine)
    }

    /// An engine over in-memory storage and the hashing embedder.
    pub fn in_memory(config: EngineConfig, rules: TypeRuleSet) -> OntoGuardResult<Self> {
        Self::new(
            config,
            OntologyHandle::new(rules),
            Arc::new(MemGraphStore::new()),
            Arc::new(HashingEmbedder::default()),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ontology(&self) -> &OntologyHandle {
        &self.ontology
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn ledger(&self) -> &AuditLedger {
        &self.ledger
    }

    pub fn guardrails(&self) -> &Guardrails {
        &self.guardrails
    }

    pub fn violations(&self) -> &ViolationRegistry {
        &self.violations
    }

    pub fn disambiguation(&self) -> &DisambiguationService {
        &self.disambiguation
    }

    /// A type checker over the current ontology snapshot.
    pub fn type_checker(&self) -> TypeChecker {
        match self.ontology.snapshot() {
            Some(rules) => TypeChecker::new(rules),
            None => TypeChecker::unloaded(),
        }
    }

    /// Swap in a new rule set. In-flight operations finish on the old one.
    pub fn reload_ontology(&self, rules: TypeRuleSet) {
        tracing::info!(
            forbidden = rules.forbidden_count(),
            compliance = rules.compliance_count(),
            "reloading ontology"
        );
        self.ontology.replace(rules);
    }

    /// Load an ontology file and swap it in.
    pub fn reload_ontology_from(&self, path: &Path) -> OntoGuardResult<()> {
        let rules = TypeRuleSet::from_path(path)?;
        self.reload_ontology(rules);
        Ok(())
    }

    /// Resolve a mention. Minted URIs are created in storage by the resolver;
    /// a merge records the surface form as an alias.
    pub fn ingest_mention(&self, mention: &EntityMention) -> OntoGuardResult<Resolution> {
        let resolution = self.disambiguation.resolve(mention)?;
        let uri = resolution.uri();
        if !resolution.minted_node() {
            if let Err(e) = self.store.add_alias(uri, &mention.name) {
                tracing::warn!(uri, error = %e, "could not record alias");
            }
        }
        Ok(resolution)
    }

    /// Validate a relationship between two stored nodes and commit it unless
    /// the critical policy blocks it.
    pub fn ingest_relationship(
        &self,
        source: &str,
        target: &str,
        relation: &str,
    ) -> OntoGuardResult<RelationshipOutcome> {
        if relation.trim().is_empty() {
            return Err(EngineError::InvalidInput {
                message: format!("relationship {source} -> {target} has an empty label"),
            }
            .into());
        }
        let source_node = self.store.get_node(source)?.ok_or_else(|| StorageError::NodeNotFound {
            uri: source.to_string(),
        })?;
        let target_node = self.store.get_node(target)?.ok_or_else(|| StorageError::NodeNotFound {
            uri: target.to_string(),
        })?;

        let report = self
            .guardrails
            .validate(&source_node.entity_type, &target_node.entity_type, relation);
        let mut candidate = RelationshipCandidate::new(source, target, relation);
        let violation_ids = self.violations.register(&candidate, &report.violations);

        let block = report.is_critical() && self.config.critical_policy == CriticalPolicy::Block;
        if block {
            let mut blocked = self
                .blocked
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for (id, finding) in violation_ids.iter().zip(&report.violations) {
                if finding.severity == Severity::Critical {
                    blocked.insert(*id, candidate.clone());
                }
            }
            tracing::warn!(candidate = %candidate, "relationship blocked pending override");
        } else {
            self.store.add_edge(&candidate.to_relationship())?;
            candidate.status = RelationStatus::Committed;
        }

        Ok(RelationshipOutcome {
            candidate,
            report,
            violation_ids,
        })
    }

    /// Override a violation; a relationship it blocked is committed.
    ///
    /// The held edge is written before the override is recorded. If storage
    /// refuses it, the violation stays open and the candidate stays blocked,
    /// so the override can be retried.
    pub fn override_violation(&self, id: u64, reason: &str, actor: &str) -> OntoGuardResult<Violation> {
        let mut blocked = self
            .blocked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(candidate) = blocked.get(&id) {
            if self.violations.get(id).is_some_and(|v| !v.overridden) {
                self.store.add_edge(&candidate.to_relationship())?;
            }
        }
        let violation = self
            .violations
            .override_violation(id, reason, actor, &self.ledger)?;
        if let Some(candidate) = blocked.remove(&id) {
            tracing::info!(id, candidate = %candidate, "blocked relationship committed after override");
        }
        Ok(violation)
    }

    /// Relationships held back by unresolved critical violations.
    pub fn blocked(&self) -> Vec<(u64, RelationshipCandidate)> {
        self.blocked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(id, c)| (*id, c.clone()))
            .collect()
    }

    /// Record that same-name entities with incompatible types are correctly
    /// kept apart, so the quality score stops counting them.
    pub fn acknowledge_conflict(&self, name: &str, reason: &str, actor: &str) -> OntoGuardResult<u64> {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return Err(EngineError::InvalidInput {
                message: "conflict acknowledgement needs a name".into(),
            }
            .into());
        }
        let seq = self
            .ledger
            .append(LedgerEvent::ConflictAcknowledged(ConflictAcknowledgement {
                name: normalized,
                info: OverrideInfo {
                    actor: actor.to_string(),
                    reason: reason.to_string(),
                    timestamp: unix_now(),
                },
            }))?;
        Ok(seq)
    }

    /// Spectral analysis of the current graph.
    pub fn analyze_structure(&self) -> OntoGuardResult<SpectralReport> {
        let snapshot = self.store.snapshot()?;
        let result = self.spectral.analyze_snapshot(&snapshot);
        Ok(self.spectral.report(&result))
    }

    /// Pair each source text with the text reconstructed from its nodes.
    pub fn text_pairs(&self, sources: &[SourceText]) -> OntoGuardResult<Vec<TextPair>> {
        let snapshot = self.store.snapshot()?;
        let index = snapshot.index();
        Ok(sources
            .iter()
            .map(|s| TextPair::new(s.text.clone(), reconstruct_text_indexed(&index, &s.uris)))
            .collect())
    }

    /// MINE score of the current graph.
    pub fn evaluate_quality(&self, corpus: &[TextPair]) -> OntoGuardResult<MineScore> {
        let snapshot = self.store.snapshot()?;
        let decisions = self.ledger.decisions();
        let acknowledged = self.ledger.acknowledged_names();
        let rules = self.ontology.snapshot();
        let inputs = QualityInputs {
            corpus,
            decisions: &decisions,
            acknowledged: Some(&acknowledged),
            rules: rules.as_deref(),
        };
        Ok(self
            .quality
            .evaluate_lists(&snapshot.entities, &snapshot.relationships, &inputs))
    }

    /// Spectral report, MINE score and compliance summary over one snapshot.
    pub fn integrity_report(&self, corpus: &[TextPair]) -> OntoGuardResult<IntegrityReport> {
        let snapshot = self.store.snapshot()?;
        let graph = matrix::build(&snapshot.entities, &snapshot.relationships);

        let spectral = self.spectral.analyze(&graph);
        let spectral = self.spectral.report(&spectral);

        let decisions = self.ledger.decisions();
        let acknowledged = self.ledger.acknowledged_names();
        let rules = self.ontology.snapshot();
        let inputs = QualityInputs {
            corpus,
            decisions: &decisions,
            acknowledged: Some(&acknowledged),
            rules: rules.as_deref(),
        };
        let names: Vec<&str> = snapshot.entities.iter().map(|e| e.name.as_str()).collect();
        let quality = self.quality.evaluate(&graph, &names, &inputs);

        let report = ReportBuilder::new()
            .spectral(spectral)
            .quality(quality)
            .violations(&self.violations.violations())
            .ledger_entries(self.ledger.len())
            .build();
        tracing::info!(
            nodes = graph.node_count(),
            entries = report.ledger_entries,
            "integrity report generated"
        );
        Ok(report)
    }

    /// Write the audit record stream as JSON lines.
    pub fn export_audit<W: Write>(&self, out: W) -> OntoGuardResult<usize> {
        Ok(self.ledger.export_jsonl(out)?)
    }
}
