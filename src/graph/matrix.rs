//! Sparse adjacency and Laplacian construction.
//!
//! Built in O(|V| + |E|): node indices come from a hash map, undirected edges
//! are deduplicated through a hash set, and both matrices are stored in CSR
//! form so the eigensolver only ever touches non-zeros.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use super::{Entity, Relationship};

/// Row count above which matrix-vector products run on the rayon pool.
const PARALLEL_ROWS: usize = 4_096;

/// Square sparse matrix in compressed sparse row form.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// Build from per-row `(column, value)` lists.
    fn from_rows(rows: Vec<Vec<(usize, f64)>>) -> Self {
        let n = rows.len();
        let nnz = rows.iter().map(Vec::len).sum();
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        row_ptr.push(0);
        for mut row in rows {
            row.sort_unstable_by_key(|(c, _)| *c);
            for (c, v) in row {
                col_idx.push(c);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }
        Self {
            n,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Dimension.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Stored non-zeros.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Entry `(row, col)`, zero when not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row >= self.n {
            return 0.0;
        }
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        match self.col_idx[range.clone()].binary_search(&col) {
            Ok(pos) => self.values[range.start + pos],
            Err(_) => 0.0,
        }
    }

    /// Sum of row `row`.
    pub fn row_sum(&self, row: usize) -> f64 {
        self.values[self.row_ptr[row]..self.row_ptr[row + 1]].iter().sum()
    }

    fn row_dot(&self, row: usize, x: &[f64]) -> f64 {
        (self.row_ptr[row]..self.row_ptr[row + 1])
            .map(|k| self.values[k] * x[self.col_idx[k]])
            .sum()
    }

    /// `y = A·x`.
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.n);
        if self.n >= PARALLEL_ROWS {
            (0..self.n).into_par_iter().map(|r| self.row_dot(r, x)).collect()
        } else {
            (0..self.n).map(|r| self.row_dot(r, x)).collect()
        }
    }
}

/// Dense node indices for a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMap {
    by_uri: HashMap<String, usize>,
    uris: Vec<String>,
}

impl IndexMap {
    fn insert(&mut self, uri: &str) -> usize {
        if let Some(&idx) = self.by_uri.get(uri) {
            return idx;
        }
        let idx = self.uris.len();
        self.by_uri.insert(uri.to_string(), idx);
        self.uris.push(uri.to_string());
        idx
    }

    pub fn index_of(&self, uri: &str) -> Option<usize> {
        self.by_uri.get(uri).copied()
    }

    pub fn uri(&self, idx: usize) -> Option<&str> {
        self.uris.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }
}

/// Matrices and adjacency lists for one graph snapshot.
#[derive(Debug, Clone)]
pub struct GraphMatrices {
    pub adjacency: SparseMatrix,
    pub laplacian: SparseMatrix,
    pub index: IndexMap,
    /// Undirected neighbor lists, indexed like the matrices.
    pub neighbors: Vec<Vec<usize>>,
    /// Distinct undirected edges, self-loops excluded.
    pub edge_count: usize,
    /// Edge endpoints that were not in the entity list.
    pub implicit_nodes: usize,
    pub self_loops_skipped: usize,
    pub duplicate_edges_skipped: usize,
}

impl GraphMatrices {
    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    /// Edge density `2E / (V·(V−1))`; zero below two nodes.
    pub fn density(&self) -> f64 {
        let n = self.node_count() as f64;
        if n < 2.0 {
            0.0
        } else {
            2.0 * self.edge_count as f64 / (n * (n - 1.0))
        }
    }

    pub fn degree(&self, idx: usize) -> usize {
        self.neighbors.get(idx).map_or(0, Vec::len)
    }
}

/// Build adjacency, Laplacian and index map from entity and relationship lists.
pub fn build(entities: &[Entity], relationships: &[Relationship]) -> GraphMatrices {
    let mut index = IndexMap::default();
    for entity in entities {
        index.insert(&entity.uri);
    }
    let declared = index.len();

    let mut seen: HashSet<(usize, usize)> = HashSet::with_capacity(relationships.len());
    let mut edges: Vec<(usize, usize)> = Vec::with_capacity(relationships.len());
    let mut self_loops_skipped = 0;
    let mut duplicate_edges_skipped = 0;
    for rel in relationships {
        let a = index.insert(&rel.source);
        let b = index.insert(&rel.target);
        if a == b {
            self_loops_skipped += 1;
            continue;
        }
        let key = if a < b { (a, b) } else { (b, a) };
        if seen.insert(key) {
            edges.push(key);
        } else {
            duplicate_edges_skipped += 1;
        }
    }

    let n = index.len();
    let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(a, b) in &edges {
        neighbors[a].push(b);
        neighbors[b].push(a);
    }

    let adjacency_rows: Vec<Vec<(usize, f64)>> = neighbors
        .iter()
        .map(|ns| ns.iter().map(|&c| (c, 1.0)).collect())
        .collect();
    let laplacian_rows: Vec<Vec<(usize, f64)>> = neighbors
        .iter()
        .enumerate()
        .map(|(r, ns)| {
            let mut row: Vec<(usize, f64)> = ns.iter().map(|&c| (c, -1.0)).collect();
            if !ns.is_empty() {
                row.push((r, ns.len() as f64));
            }
            row
        })
        .collect();

    GraphMatrices {
        adjacency: SparseMatrix::from_rows(adjacency_rows),
        laplacian: SparseMatrix::from_rows(laplacian_rows),
        index,
        neighbors,
        edge_count: edges.len(),
        implicit_nodes: n - declared,
        self_loops_skipped,
        duplicate_edges_skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(uri: &str) -> Entity {
        Entity::new(uri, uri, "Thing")
    }

    #[test]
    fn dedups_undirected_edges_and_skips_self_loops() {
        let entities = vec![entity("a"), entity("b"), entity("c")];
        let rels = vec![
            Relationship::new("a", "b", "R"),
            Relationship::new("b", "a", "S"),
            Relationship::new("a", "a", "R"),
            Relationship::new("b", "c", "R"),
        ];
        let m = build(&entities, &rels);
        assert_eq!(m.edge_count, 2);
        assert_eq!(m.self_loops_skipped, 1);
        assert_eq!(m.duplicate_edges_skipped, 1);
        assert_eq!(m.adjacency.nnz(), 4);
    }

    #[test]
    fn laplacian_rows_sum_to_zero() {
        let entities = vec![entity("a"), entity("b"), entity("c")];
        let rels = vec![Relationship::new("a", "b", "R"), Relationship::new("b", "c", "R")];
        let m = build(&entities, &rels);
        let b = m.index.index_of("b").unwrap();
        assert_eq!(m.laplacian.get(b, b), 2.0);
        for r in 0..m.node_count() {
            assert_eq!(m.laplacian.row_sum(r), 0.0);
        }
    }

    #[test]
    fn unknown_endpoints_become_implicit_nodes() {
        let m = build(&[entity("a")], &[Relationship::new("a", "z", "R")]);
        assert_eq!(m.node_count(), 2);
        assert_eq!(m.implicit_nodes, 1);
        assert_eq!(m.index.uri(1), Some("z"));
    }

    #[test]
    fn mul_vec_matches_definition() {
        let entities = vec![entity("a"), entity("b"), entity("c")];
        let rels = vec![Relationship::new("a", "b", "R"), Relationship::new("b", "c", "R")];
        let m = build(&entities, &rels);
        // Path a-b-c: L·[1, 0, -1] = [1, 0, -1].
        let y = m.laplacian.mul_vec(&[1.0, 0.0, -1.0]);
        assert_eq!(y, vec![1.0, 0.0, -1.0]);
    }

    #[test]
    fn density_of_triangle_is_one() {
        let entities = vec![entity("a"), entity("b"), entity("c")];
        let rels = vec![
            Relationship::new("a", "b", "R"),
            Relationship::new("b", "c", "R"),
            Relationship::new("c", "a", "R"),
        ];
        assert!((build(&entities, &rels).density() - 1.0).abs() < 1e-12);
    }
}
