//! The disambiguation service: per-mention resolution state machine.
//!
//! The service owns a name index of the entities it has resolved (optionally
//! hydrated from a storage snapshot) and reserves every URI it proposes, so
//! two concurrent callers can never be handed the same fresh URI. A minted URI
//! is written to storage before it is indexed or recorded; if that write
//! fails the reservation is released and nothing reaches the ledger.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::audit::{AuditLedger, LedgerEvent, unix_now};
use crate::deadline::{CallFailure, run_with_timeout};
use crate::error::{EngineError, OntoGuardResult, StorageError};
use crate::graph::GraphSnapshot;
use crate::ontology::{OntologyHandle, TypeChecker, TypeRuleSet};
use crate::store::GraphStore;

use super::strategy::{CorroborationContext, CorroborationStrategy, ExpectedNeighborTypes, NeighborInfo};
use super::{
    ConflictCandidate, DisambiguationDecision, EntityMention, ResolutionMethod, base_uri,
    normalize_name,
};

/// Confidence of a unique URI minted without usable graph context.
const DEGRADED_CONFIDENCE: f32 = 0.6;
const UNIQUE_CONFIDENCE: f32 = 0.9;
const CONTEXT_BASE_CONFIDENCE: f32 = 0.5;
const CONTEXT_STEP: f32 = 0.1;
const CONTEXT_CAP: f32 = 0.95;

/// An entity known to the name index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedEntity {
    pub uri: String,
    pub name: String,
    pub entity_type: String,
}

/// A completed resolution: the decision and its ledger sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub seq: u64,
    pub decision: DisambiguationDecision,
}

impl Resolution {
    pub fn uri(&self) -> &str {
        &self.decision.resolved_uri
    }

    /// Whether resolution created a new node for the URI.
    pub fn minted_node(&self) -> bool {
        self.decision.method.mints()
    }
}

/// Context-aware entity resolver.
pub struct DisambiguationService {
    ontology: OntologyHandle,
    store: Arc<dyn GraphStore>,
    ledger: Arc<AuditLedger>,
    strategy: Arc<dyn CorroborationStrategy>,
    namespace: String,
    storage_timeout: Duration,
    /// Single writer per normalized name.
    name_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Normalized name or alias → entities carrying it.
    by_name: DashMap<String, Vec<IndexedEntity>>,
    /// Every URI handed out or loaded.
    by_uri: DashMap<String, IndexedEntity>,
    /// Highest suffix allocated per base URI.
    suffixes: DashMap<String, u32>,
}

impl std::fmt::Debug for DisambiguationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisambiguationService")
            .field("namespace", &self.namespace)
            .field("strategy", &self.strategy.name())
            .field("storage_timeout", &self.storage_timeout)
            .field("indexed_uris", &self.by_uri.len())
            .finish()
    }
}

impl DisambiguationService {
    pub fn new(
        ontology: OntologyHandle,
        store: Arc<dyn GraphStore>,
        ledger: Arc<AuditLedger>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            ontology,
            store,
            ledger,
            strategy: Arc::new(ExpectedNeighborTypes),
            namespace: namespace.into(),
            storage_timeout: Duration::from_millis(2_000),
            name_locks: DashMap::new(),
            by_name: DashMap::new(),
            by_uri: DashMap::new(),
            suffixes: DashMap::new(),
        }
    }

    /// Replace the corroboration strategy.
    pub fn with_strategy(mut self, strategy: Arc<dyn CorroborationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Bound every storage call made during resolution.
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    /// Index every entity of a storage snapshot by name, aliases and URI.
    pub fn hydrate(&self, snapshot: &GraphSnapshot) -> usize {
        let rules = self.ontology.snapshot();
        let mut indexed = 0;
        for entity in &snapshot.entities {
            let entity_type = match rules.as_deref() {
                Some(rules) => rules.canonical(&entity.entity_type),
                None => entity.entity_type.clone(),
            };
            let record = IndexedEntity {
                uri: entity.uri.clone(),
                name: entity.name.clone(),
                entity_type,
            };
            if self.by_uri.insert(entity.uri.clone(), record.clone()).is_some() {
                continue;
            }
            self.index_name(&normalize_name(&entity.name), &record);
            for alias in &entity.aliases {
                self.index_name(&normalize_name(alias), &record);
            }
            indexed += 1;
        }
        tracing::info!(indexed, "hydrated disambiguation index");
        indexed
    }

    /// Entities indexed under a name (normalized before lookup).
    pub fn lookup(&self, name: &str) -> Vec<IndexedEntity> {
        self.by_name
            .get(&normalize_name(name))
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    /// Record an additional surface form for an indexed URI.
    pub fn add_alias(&self, uri: &str, alias: &str) {
        let Some(record) = self.by_uri.get(uri).map(|r| r.value().clone()) else {
            return;
        };
        self.index_name(&normalize_name(alias), &record);
    }

    /// Resolve a mention to a URI and append the decision to the ledger.
    pub fn resolve(&self, mention: &EntityMention) -> OntoGuardResult<Resolution> {
        let normalized = normalize_name(&mention.name);
        if normalized.is_empty() {
            return Err(EngineError::InvalidInput {
                message: "entity mention has an empty name".into(),
            }
            .into());
        }
        if mention.declared_type.trim().is_empty() {
            return Err(EngineError::InvalidInput {
                message: format!("entity mention \"{}\" has an empty type", mention.name),
            }
            .into());
        }

        let lock = self
            .name_locks
            .entry(normalized.clone())
            .or_default()
            .value()
            .clone();
        let result = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.resolve_locked(mention, normalized.clone())
        };
        drop(lock);
        // Only the map still holds the lock once no resolver waits on it.
        self.name_locks
            .remove_if(&normalized, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Number of names with a live resolution lock.
    pub fn active_name_locks(&self) -> usize {
        self.name_locks.len()
    }

    fn resolve_locked(&self, mention: &EntityMention, normalized: String) -> OntoGuardResult<Resolution> {
        let rules = self.ontology.snapshot();
        let checker = match &rules {
            Some(rules) => TypeChecker::new(Arc::clone(rules)),
            None => TypeChecker::unloaded(),
        };
        let canonical_type = checker.canonical(&mention.declared_type);

        let existing = self.lookup(&normalized);
        let mut conflicts: Vec<ConflictCandidate> = existing
            .iter()
            .map(|c| {
                let compat = checker.compatible(&c.entity_type, &canonical_type);
                ConflictCandidate {
                    uri: c.uri.clone(),
                    entity_type: c.entity_type.clone(),
                    compatible: compat.compatible,
                    reason: compat.reason,
                    corroboration: 0,
                }
            })
            .collect();

        let base = base_uri(&self.namespace, &canonical_type, &normalized);
        let entity = |uri: &str| IndexedEntity {
            uri: uri.to_string(),
            name: mention.name.clone(),
            entity_type: canonical_type.clone(),
        };

        let compatible_idx: Vec<usize> = conflicts
            .iter()
            .enumerate()
            .filter(|(_, c)| c.compatible)
            .map(|(i, _)| i)
            .collect();

        let (method, uri, confidence, reason, degraded) = if conflicts.is_empty() {
            let uri = if self.reserve(&base, entity(&base)) {
                base.clone()
            } else {
                self.allocate_suffixed(&base, &entity)
            };
            let reason = if uri == base {
                format!("no existing entity named \"{normalized}\"")
            } else {
                format!("no existing entity named \"{normalized}\"; base URI {base} was taken")
            };
            (ResolutionMethod::New, uri, 1.0, reason, false)
        } else if let [only] = compatible_idx.as_slice() {
            let only = &conflicts[*only];
            let uri = only.uri.clone();
            let incompatible = conflicts.iter().filter(|c| !c.compatible).count();
            let mut reason = format!("single compatible candidate {} ({})", only.uri, only.entity_type);
            if incompatible > 0 {
                reason.push_str(&format!("; kept apart from {incompatible} incompatible"));
            }
            (ResolutionMethod::ExactMerge, uri, 1.0, reason, false)
        } else {
            match self.score_context(mention, &canonical_type, rules.as_deref(), &mut conflicts) {
                Ok(()) => {
                    let corroborated: Vec<&ConflictCandidate> = conflicts
                        .iter()
                        .filter(|c| c.compatible && c.corroboration > 0)
                        .collect();
                    if let [winner] = corroborated.as_slice() {
                        let confidence = (CONTEXT_BASE_CONFIDENCE
                            + CONTEXT_STEP * winner.corroboration as f32)
                            .min(CONTEXT_CAP);
                        let reason = format!(
                            "{} neighbor(s) of {} corroborate {canonical_type} ({})",
                            winner.corroboration,
                            winner.uri,
                            self.strategy.name()
                        );
                        (
                            ResolutionMethod::ContextDisambiguated,
                            winner.uri.clone(),
                            confidence,
                            reason,
                            false,
                        )
                    } else {
                        let uri = self.allocate_suffixed(&base, &entity);
                        let reason = format!(
                            "{} candidate(s) named \"{normalized}\", {} compatible, {} corroborated; minted a distinct URI",
                            conflicts.len(),
                            conflicts.iter().filter(|c| c.compatible).count(),
                            corroborated.len()
                        );
                        (ResolutionMethod::UniqueUri, uri, UNIQUE_CONFIDENCE, reason, false)
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        name = %normalized,
                        error = %err,
                        "context lookup failed; minting without context"
                    );
                    let uri = self.allocate_suffixed(&base, &entity);
                    let reason = format!("degraded: context lookup failed ({err}); minted a distinct URI");
                    (ResolutionMethod::UniqueUri, uri, DEGRADED_CONFIDENCE, reason, true)
                }
            }
        };

        match method {
            ResolutionMethod::New | ResolutionMethod::UniqueUri => {
                self.create_node(mention, &canonical_type, &uri)?;
                self.index_name(&normalized, &entity(&uri));
            }
            ResolutionMethod::ExactMerge | ResolutionMethod::ContextDisambiguated => {
                self.add_alias(&uri, &mention.name);
            }
        }
        conflicts.retain(|c| c.uri != uri);

        let decision = DisambiguationDecision {
            mention: mention.clone(),
            normalized_name: normalized,
            canonical_type,
            resolved_uri: uri,
            confidence,
            method,
            conflicts,
            reason,
            degraded,
            timestamp: unix_now(),
        };
        let seq = self
            .ledger
            .append(LedgerEvent::Disambiguation(decision.clone()))?;
        tracing::debug!(
            seq,
            name = %decision.normalized_name,
            uri = %decision.resolved_uri,
            method = %decision.method,
            confidence = decision.confidence,
            degraded = decision.degraded,
            "disambiguation decision"
        );
        Ok(Resolution { seq, decision })
    }

    /// Write the node for a freshly reserved URI, releasing the reservation
    /// when storage refuses it.
    fn create_node(&self, mention: &EntityMention, canonical_type: &str, uri: &str) -> OntoGuardResult<()> {
        match self.store.create_node(&mention.name, canonical_type, uri) {
            Ok(_) => Ok(()),
            Err(StorageError::NodeExists { .. }) => {
                tracing::warn!(uri, "minted URI already present in storage");
                Ok(())
            }
            Err(err) => {
                self.by_uri.remove(uri);
                tracing::warn!(uri, error = %err, "node creation failed; released reservation");
                Err(err.into())
            }
        }
    }

    fn index_name(&self, normalized: &str, record: &IndexedEntity) {
        let mut entry = self.by_name.entry(normalized.to_string()).or_default();
        if !entry.iter().any(|e| e.uri == record.uri) {
            entry.push(record.clone());
        }
    }

    /// Score every candidate's neighborhood. Fails if storage does.
    fn score_context(
        &self,
        mention: &EntityMention,
        mention_type: &str,
        rules: Option<&TypeRuleSet>,
        conflicts: &mut [ConflictCandidate],
    ) -> Result<(), StorageError> {
        for candidate in conflicts.iter_mut() {
            let neighbors = self.fetch_context(&candidate.uri, rules)?;
            let ctx = CorroborationContext {
                mention,
                mention_type,
                candidate_uri: &candidate.uri,
                candidate_type: &candidate.entity_type,
                neighbors: &neighbors,
                rules,
            };
            candidate.corroboration = self.strategy.corroborating(&ctx);
        }
        Ok(())
    }

    /// One bounded storage call: neighbors of `uri` with their names and types.
    fn fetch_context(&self, uri: &str, rules: Option<&TypeRuleSet>) -> Result<Vec<NeighborInfo>, StorageError> {
        let store = Arc::clone(&self.store);
        let target = uri.to_string();
        let fetched = run_with_timeout(self.storage_timeout, move || {
            let uris = store.get_neighbors(&target)?;
            let mut nodes = Vec::with_capacity(uris.len());
            for neighbor in uris {
                let node = store.get_node(&neighbor)?;
                nodes.push((neighbor, node));
            }
            Ok::<_, StorageError>(nodes)
        });
        let nodes = self.bounded("get_neighbors", fetched)?;
        let neighbors = nodes
            .into_iter()
            .map(|(uri, node)| {
                let (name, entity_type) = match node {
                    Some(entity) => {
                        let ty = match rules {
                            Some(rules) => rules.canonical(&entity.entity_type),
                            None => entity.entity_type,
                        };
                        (Some(entity.name), Some(ty))
                    }
                    None => match self.by_uri.get(&uri) {
                        Some(record) => (Some(record.name.clone()), Some(record.entity_type.clone())),
                        None => (None, None),
                    },
                };
                NeighborInfo {
                    uri,
                    name,
                    entity_type,
                }
            })
            .collect();
        Ok(neighbors)
    }

    fn bounded<T>(
        &self,
        operation: &str,
        result: Result<Result<T, StorageError>, CallFailure>,
    ) -> Result<T, StorageError> {
        match result {
            Ok(inner) => inner,
            Err(CallFailure::TimedOut) => Err(StorageError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.storage_timeout.as_millis() as u64,
            }),
            Err(CallFailure::Panicked) => Err(StorageError::Unreachable {
                message: format!("{operation} call panicked"),
            }),
        }
    }

    /// Whether storage already holds `uri`. Unknown when storage fails: the
    /// index alone then decides.
    fn exists_in_storage(&self, uri: &str) -> bool {
        let store = Arc::clone(&self.store);
        let target = uri.to_string();
        let result = run_with_timeout(self.storage_timeout, move || store.node_exists(&target));
        match self.bounded("node_exists", result) {
            Ok(exists) => exists,
            Err(err) => {
                tracing::warn!(uri, error = %err, "node_exists failed; trusting the local index");
                false
            }
        }
    }

    /// Atomically claim `uri` for `record`.
    fn reserve(&self, uri: &str, record: IndexedEntity) -> bool {
        if self.by_uri.contains_key(uri) || self.exists_in_storage(uri) {
            return false;
        }
        match self.by_uri.entry(uri.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// Claim `{base}-{n}` for the smallest free n above the last one allocated.
    fn allocate_suffixed(&self, base: &str, entity: &dyn Fn(&str) -> IndexedEntity) -> String {
        let mut n = self.suffixes.get(base).map(|n| *n.value()).unwrap_or(0);
        loop {
            n += 1;
            let uri = format!("{base}-{n}");
            if self.reserve(&uri, entity(&uri)) {
                let mut last = self.suffixes.entry(base.to_string()).or_insert(0);
                if *last < n {
                    *last = n;
                }
                return uri;
            }
        }
    }
}
