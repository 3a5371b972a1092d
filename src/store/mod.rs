//! Storage seams.
//!
//! - [`GraphStore`]: the capability interface to external graph storage
//! - [`MemGraphStore`]: concurrent in-memory stand-in (DashMap), with
//!   failure and latency injection for degraded-mode testing
//! - [`DurableLog`]: ACID append log (redb) backing the audit ledger

pub mod durable;
pub mod mem;

use crate::error::StorageError;
use crate::graph::{Entity, GraphSnapshot, Relationship};

pub use durable::DurableLog;
pub use mem::MemGraphStore;

/// Result type for graph storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Minimal capability interface to the graph storage backend.
///
/// This core proposes URIs and writes nodes and edges; it never deletes.
pub trait GraphStore: Send + Sync {
    /// URIs of the one-hop neighbors of `uri` (either direction).
    fn get_neighbors(&self, uri: &str) -> StorageResult<Vec<String>>;

    /// Create a node. Fails with [`StorageError::NodeExists`] on a taken URI.
    fn create_node(&self, name: &str, entity_type: &str, uri: &str) -> StorageResult<Entity>;

    /// Whether a node with this URI exists.
    fn node_exists(&self, uri: &str) -> StorageResult<bool>;

    /// Fetch a node by URI.
    fn get_node(&self, uri: &str) -> StorageResult<Option<Entity>>;

    /// Record an additional surface form on an existing node.
    fn add_alias(&self, uri: &str, alias: &str) -> StorageResult<()>;

    /// Commit an edge. Duplicate edges are ignored.
    fn add_edge(&self, relationship: &Relationship) -> StorageResult<()>;

    /// Copy of the whole graph for batch analysis.
    fn snapshot(&self) -> StorageResult<GraphSnapshot>;
}
