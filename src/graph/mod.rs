//! Graph data model and whole-graph analysis.
//!
//! The graph itself lives in external storage (see [`crate::store`]); this
//! module holds the shapes that cross that boundary and the batch analyses
//! run over a [`GraphSnapshot`]:
//!
//! - [`matrix`]: sparse adjacency/Laplacian construction
//! - [`components`]: union-find labeling and articulation points
//! - [`spectral`]: Lanczos-based algebraic connectivity

pub mod components;
pub mod matrix;
pub mod spectral;

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// A resolved entity (node) as owned by graph storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Opaque node URI.
    pub uri: String,
    /// Display name as first mentioned.
    pub name: String,
    /// Canonical type.
    pub entity_type: String,
    /// Other surface forms merged into this node.
    pub aliases: BTreeSet<String>,
    /// Creation time (seconds since UNIX epoch).
    pub created_at: u64,
}

impl Entity {
    /// Create an entity stamped with the current time.
    pub fn new(
        uri: impl Into<String>,
        name: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            entity_type: entity_type.into(),
            aliases: BTreeSet::new(),
            created_at: crate::audit::unix_now(),
        }
    }
}

/// A committed edge between two node URIs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub relation: String,
}

impl Relationship {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
        }
    }
}

/// Lifecycle of a proposed relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationStatus {
    Pending,
    Committed,
}

impl std::fmt::Display for RelationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Committed => write!(f, "committed"),
        }
    }
}

/// A relationship proposed by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    pub source: String,
    pub target: String,
    pub relation: String,
    pub status: RelationStatus,
}

impl RelationshipCandidate {
    /// A new pending candidate.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
            status: RelationStatus::Pending,
        }
    }

    /// The edge this candidate would commit.
    pub fn to_relationship(&self) -> Relationship {
        Relationship::new(&self.source, &self.target, &self.relation)
    }
}

impl std::fmt::Display for RelationshipCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -[{}]-> {}", self.source, self.relation, self.target)
    }
}

/// A read-only copy of the whole graph for batch analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl GraphSnapshot {
    pub fn new(entities: Vec<Entity>, relationships: Vec<Relationship>) -> Self {
        Self {
            entities,
            relationships,
        }
    }

    /// Build URI lookups over this snapshot.
    pub fn index(&self) -> SnapshotIndex<'_> {
        SnapshotIndex::new(self)
    }
}

/// Borrowed lookups over a [`GraphSnapshot`]: entities by URI and the
/// relationships incident to each URI.
#[derive(Debug)]
pub struct SnapshotIndex<'a> {
    snapshot: &'a GraphSnapshot,
    by_uri: HashMap<&'a str, &'a Entity>,
    /// URI → positions in `snapshot.relationships`, ascending.
    incident: HashMap<&'a str, Vec<usize>>,
}

impl<'a> SnapshotIndex<'a> {
    pub fn new(snapshot: &'a GraphSnapshot) -> Self {
        let by_uri = snapshot
            .entities
            .iter()
            .map(|e| (e.uri.as_str(), e))
            .collect();
        let mut incident: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (i, rel) in snapshot.relationships.iter().enumerate() {
            incident.entry(rel.source.as_str()).or_default().push(i);
            if rel.target != rel.source {
                incident.entry(rel.target.as_str()).or_default().push(i);
            }
        }
        Self {
            snapshot,
            by_uri,
            incident,
        }
    }

    pub fn entity(&self, uri: &str) -> Option<&'a Entity> {
        self.by_uri.get(uri).copied()
    }

    /// Relationships touching any of `uris`, each once, in snapshot order.
    pub fn relationships_touching<'u>(
        &self,
        uris: impl IntoIterator<Item = &'u str>,
    ) -> Vec<&'a Relationship> {
        let positions: BTreeSet<usize> = uris
            .into_iter()
            .filter_map(|uri| self.incident.get(uri))
            .flatten()
            .copied()
            .collect();
        positions
            .into_iter()
            .map(|i| &self.snapshot.relationships[i])
            .collect()
    }
}
