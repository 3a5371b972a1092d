//! Connected components and articulation points.

use std::collections::HashMap;

use petgraph::unionfind::UnionFind;

use super::matrix::GraphMatrices;

/// Connected-component labeling of a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Components {
    /// Component id per node index (ids are dense, ordered by first node).
    pub labels: Vec<usize>,
    /// Size per component id.
    pub sizes: Vec<usize>,
}

impl Components {
    pub fn count(&self) -> usize {
        self.sizes.len()
    }

    /// Size of the largest connected component (0 for an empty graph).
    pub fn largest(&self) -> usize {
        self.sizes.iter().copied().max().unwrap_or(0)
    }

    pub fn is_connected(&self) -> bool {
        self.sizes.len() == 1
    }
}

/// Label components with union-find over the deduplicated edge lists.
pub fn label(graph: &GraphMatrices) -> Components {
    let n = graph.node_count();
    let mut uf = UnionFind::<usize>::new(n);
    for (a, ns) in graph.neighbors.iter().enumerate() {
        for &b in ns {
            if a < b {
                uf.union(a, b);
            }
        }
    }

    let roots = uf.into_labeling();
    let mut dense: HashMap<usize, usize> = HashMap::new();
    let mut sizes = Vec::new();
    let labels = roots
        .into_iter()
        .map(|root| {
            let next = dense.len();
            let id = *dense.entry(root).or_insert(next);
            if id == sizes.len() {
                sizes.push(0);
            }
            sizes[id] += 1;
            id
        })
        .collect();
    Components { labels, sizes }
}

/// Nodes whose removal disconnects their component, in index order.
///
/// Iterative Tarjan lowpoint search, so deep path graphs cannot overflow the
/// stack.
pub fn articulation_points(graph: &GraphMatrices) -> Vec<usize> {
    let n = graph.node_count();
    let mut disc = vec![usize::MAX; n];
    let mut low = vec![0usize; n];
    let mut parent = vec![usize::MAX; n];
    let mut is_cut = vec![false; n];
    let mut timer = 0;

    for root in 0..n {
        if disc[root] != usize::MAX {
            continue;
        }
        let mut root_children = 0;
        // (node, next neighbor position)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        disc[root] = timer;
        low[root] = timer;
        timer += 1;

        while let Some(top) = stack.last_mut() {
            let (u, pos) = *top;
            if let Some(&v) = graph.neighbors[u].get(pos) {
                top.1 += 1;
                if disc[v] == usize::MAX {
                    parent[v] = u;
                    disc[v] = timer;
                    low[v] = timer;
                    timer += 1;
                    if u == root {
                        root_children += 1;
                    }
                    stack.push((v, 0));
                } else if v != parent[u] {
                    low[u] = low[u].min(disc[v]);
                }
            } else {
                stack.pop();
                let p = parent[u];
                if p != usize::MAX {
                    low[p] = low[p].min(low[u]);
                    if p != root && low[u] >= disc[p] {
                        is_cut[p] = true;
                    }
                }
            }
        }
        if root_children > 1 {
            is_cut[root] = true;
        }
    }

    (0..n).filter(|&i| is_cut[i]).collect()
}
