//! In-memory graph storage backed by DashMap.
//!
//! Stands in for the external graph database in tests and the CLI. All data
//! is lost on process exit. Reachability and latency can be toggled at
//! runtime to exercise the degraded and timeout paths.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use dashmap::{DashMap, DashSet};

use crate::error::StorageError;
use crate::graph::{Entity, GraphSnapshot, Relationship};

use super::{GraphStore, StorageResult};

/// Concurrent in-memory graph store.
#[derive(Debug, Default)]
pub struct MemGraphStore {
    nodes: DashMap<String, Entity>,
    adjacency: DashMap<String, BTreeSet<String>>,
    edges: RwLock<Vec<Relationship>>,
    edge_set: DashMap<Relationship, ()>,
    unreachable: AtomicBool,
    /// Operations that fail while the rest of the store keeps working.
    failing: DashSet<String>,
    latency_ms: AtomicU64,
}

impl MemGraphStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StorageError::Unreachable`] (or succeed again).
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make one operation (`"create_node"`, `"add_edge"`, ...) fail with
    /// [`StorageError::Unreachable`] until [`clear_failures`](Self::clear_failures).
    pub fn fail_on(&self, operation: &str) {
        self.failing.insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.clear();
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.edge_set.len()
    }

    fn gate(&self, operation: &str) -> StorageResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            std::thread::sleep(Duration::from_millis(latency));
        }
        if self.unreachable.load(Ordering::SeqCst) || self.failing.contains(operation) {
            return Err(StorageError::Unreachable {
                message: format!("in-memory store marked unreachable during {operation}"),
            });
        }
        Ok(())
    }
}

impl GraphStore for MemGraphStore {
    fn get_neighbors(&self, uri: &str) -> StorageResult<Vec<String>> {
        self.gate("get_neighbors")?;
        Ok(self
            .adjacency
            .get(uri)
            .map(|set| set.value().iter().cloned().collect())
            .unwrap_or_default())
    }

    fn create_node(&self, name: &str, entity_type: &str, uri: &str) -> StorageResult<Entity> {
        self.gate("create_node")?;
        match self.nodes.entry(uri.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StorageError::NodeExists {
                uri: uri.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let entity = Entity::new(uri, name, entity_type);
                slot.insert(entity.clone());
                Ok(entity)
            }
        }
    }

    fn node_exists(&self, uri: &str) -> StorageResult<bool> {
        self.gate("node_exists")?;
        Ok(self.nodes.contains_key(uri))
    }

    fn get_node(&self, uri: &str) -> StorageResult<Option<Entity>> {
        self.gate("get_node")?;
        Ok(self.nodes.get(uri).map(|e| e.value().clone()))
    }

    fn add_alias(&self, uri: &str, alias: &str) -> StorageResult<()> {
        self.gate("add_alias")?;
        match self.nodes.get_mut(uri) {
            Some(mut entity) => {
                if entity.name != alias {
                    entity.aliases.insert(alias.to_string());
                }
                Ok(())
            }
            None => Err(StorageError::NodeNotFound {
                uri: uri.to_string(),
            }),
        }
    }

    fn add_edge(&self, relationship: &Relationship) -> StorageResult<()> {
        self.gate("add_edge")?;
        if self.edge_set.insert(relationship.clone(), ()).is_some() {
            return Ok(());
        }
        self.adjacency
            .entry(relationship.source.clone())
            .or_default()
            .insert(relationship.target.clone());
        self.adjacency
            .entry(relationship.target.clone())
            .or_default()
            .insert(relationship.source.clone());
        self.edges
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(relationship.clone());
        Ok(())
    }

    fn snapshot(&self) -> StorageResult<GraphSnapshot> {
        self.gate("snapshot")?;
        let mut entities: Vec<Entity> = self.nodes.iter().map(|e| e.value().clone()).collect();
        entities.sort_by(|a, b| a.uri.cmp(&b.uri));
        let relationships = self
            .edges
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        Ok(GraphSnapshot::new(entities, relationships))
    }
}
