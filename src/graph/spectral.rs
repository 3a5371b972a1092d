//! Spectral robustness analysis.
//!
//! λ1 is the largest eigenvalue of the adjacency matrix, λ2 (the Fiedler
//! value) the second-smallest eigenvalue of the Laplacian. Both come from a
//! Lanczos iteration over the sparse matrices with full reorthogonalization.
//! For λ2 the Krylov space is kept orthogonal to the constant vector (the
//! Laplacian's null vector on a connected graph), so the smallest Ritz value
//! of the deflated operator converges to λ2 directly. Ritz values are read off
//! the tridiagonal matrix by Sturm-sequence bisection.
//!
//! Component labeling runs first: a disconnected graph has λ2 = 0 exactly and
//! skips the Laplacian solve.

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::components::{self, Components};
use super::matrix::{self, GraphMatrices, SparseMatrix};
use super::GraphSnapshot;

/// λ2 above this is robust.
pub const ROBUST_THRESHOLD: f64 = 5.0;
/// λ2 below this is fragile.
pub const FRAGILE_THRESHOLD: f64 = 2.0;
/// Relative distance from a threshold that counts as on it.
pub const BOUNDARY_EPSILON: f64 = 1e-9;
/// Articulation nodes listed in a fragile report.
const MAX_LISTED_ARTICULATION: usize = 10;

/// Robustness classification of λ2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobustnessClass {
    Robust,
    Moderate,
    Fragile,
}

impl RobustnessClass {
    /// Classify λ2; values within `BOUNDARY_EPSILON·max(1, λ2)` of 2.0 or 5.0
    /// are moderate.
    pub fn classify(lambda2: f64) -> Self {
        let eps = BOUNDARY_EPSILON * lambda2.abs().max(1.0);
        if (lambda2 - FRAGILE_THRESHOLD).abs() <= eps || (lambda2 - ROBUST_THRESHOLD).abs() <= eps {
            Self::Moderate
        } else if lambda2 > ROBUST_THRESHOLD {
            Self::Robust
        } else if lambda2 > FRAGILE_THRESHOLD {
            Self::Moderate
        } else {
            Self::Fragile
        }
    }
}

impl std::fmt::Display for RobustnessClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Robust => write!(f, "robust"),
            Self::Moderate => write!(f, "moderate"),
            Self::Fragile => write!(f, "fragile"),
        }
    }
}

/// Structural condition of the analyzed graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphCondition {
    Connected,
    Disconnected { components: usize },
    /// Fewer than two nodes or no edges.
    Degenerate,
}

impl std::fmt::Display for GraphCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Disconnected { components } => write!(f, "disconnected ({components} components)"),
            Self::Degenerate => write!(f, "degenerate"),
        }
    }
}

/// Eigensolver limits.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralConfig {
    /// Lanczos steps per eigenvalue (also capped by the matrix dimension).
    pub max_iterations: usize,
    /// Convergence threshold on successive Ritz values, relative to max(1, |θ|).
    pub tolerance: f64,
    /// Wall-clock budget for the whole analysis.
    pub time_budget: Duration,
    /// Seed of the Lanczos start vector.
    pub seed: u64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            max_iterations: 300,
            tolerance: 1e-10,
            time_budget: Duration::from_secs(30),
            seed: 0x5EED_F1ED,
        }
    }
}

/// Outcome of a spectral analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralResult {
    pub lambda1: f64,
    /// Fiedler value, never negative.
    pub lambda2: f64,
    /// λ1 − λ2.
    pub spectral_gap: f64,
    pub class: RobustnessClass,
    pub condition: GraphCondition,
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    pub component_count: usize,
    pub largest_component: usize,
    /// Lowest-degree articulation nodes, listed when the graph is fragile.
    pub articulation_nodes: Vec<String>,
    /// The budget ran out; eigenvalues are the current Ritz estimates.
    pub timed_out: bool,
    /// Every Lanczos solve settled before its step limit. When false the
    /// reported λ2 is an upper estimate.
    pub converged: bool,
    /// Lanczos steps taken across both solves.
    pub iterations: usize,
}

impl SpectralResult {
    pub fn is_degenerate(&self) -> bool {
        self.condition == GraphCondition::Degenerate
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self.condition, GraphCondition::Disconnected { .. })
    }
}

/// A spectral result with its narrative and recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralReport {
    pub result: SpectralResult,
    pub narrative: String,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extreme {
    Smallest,
    Largest,
}

struct LanczosOutcome {
    value: f64,
    iterations: usize,
    timed_out: bool,
    converged: bool,
}

/// Batch analyzer over graph snapshots.
#[derive(Debug, Clone, Default)]
pub struct SpectralAnalyzer {
    config: SpectralConfig,
}

impl SpectralAnalyzer {
    pub fn new(config: SpectralConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpectralConfig {
        &self.config
    }

    /// Build the matrices for a snapshot and analyze them.
    pub fn analyze_snapshot(&self, snapshot: &GraphSnapshot) -> SpectralResult {
        let graph = matrix::build(&snapshot.entities, &snapshot.relationships);
        self.analyze(&graph)
    }

    /// Analyze prebuilt matrices.
    pub fn analyze(&self, graph: &GraphMatrices) -> SpectralResult {
        let started = Instant::now();
        let deadline = started + self.config.time_budget;
        let n = graph.node_count();
        let components = components::label(graph);

        let mut result = SpectralResult {
            lambda1: 0.0,
            lambda2: 0.0,
            spectral_gap: 0.0,
            class: RobustnessClass::Fragile,
            condition: GraphCondition::Degenerate,
            node_count: n,
            edge_count: graph.edge_count,
            density: graph.density(),
            component_count: components.count(),
            largest_component: components.largest(),
            articulation_nodes: Vec::new(),
            timed_out: false,
            converged: true,
            iterations: 0,
        };

        if n < 2 || graph.edge_count == 0 {
            tracing::debug!(nodes = n, edges = graph.edge_count, "degenerate graph");
            return result;
        }

        let adjacency = self.lanczos(&graph.adjacency, false, Extreme::Largest, deadline);
        result.lambda1 = adjacency.value;
        result.iterations += adjacency.iterations;
        result.timed_out |= adjacency.timed_out;
        result.converged &= adjacency.converged;

        if components.is_connected() {
            result.condition = GraphCondition::Connected;
            let fiedler = self.lanczos(&graph.laplacian, true, Extreme::Smallest, deadline);
            result.lambda2 = fiedler.value.max(0.0);
            result.iterations += fiedler.iterations;
            result.timed_out |= fiedler.timed_out;
            result.converged &= fiedler.converged;
        } else {
            result.condition = GraphCondition::Disconnected {
                components: components.count(),
            };
        }

        result.spectral_gap = result.lambda1 - result.lambda2;
        result.class = RobustnessClass::classify(result.lambda2);
        if result.class == RobustnessClass::Fragile {
            result.articulation_nodes = lowest_degree_articulation(graph, &components);
        }

        if result.timed_out {
            tracing::warn!(
                nodes = n,
                iterations = result.iterations,
                budget_ms = self.config.time_budget.as_millis() as u64,
                "spectral analysis hit its time budget"
            );
        } else if !result.converged {
            tracing::warn!(
                nodes = n,
                iterations = result.iterations,
                max_iterations = self.config.max_iterations,
                "lanczos stopped at its step limit before converging"
            );
        }
        tracing::info!(
            nodes = n,
            edges = graph.edge_count,
            lambda1 = result.lambda1,
            lambda2 = result.lambda2,
            class = %result.class,
            condition = %result.condition,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "spectral analysis complete"
        );
        result
    }

    /// Extreme eigenvalue of a symmetric sparse matrix by Lanczos.
    ///
    /// With `deflate_constant` the iteration stays in the complement of the
    /// all-ones vector.
    fn lanczos(
        &self,
        op: &SparseMatrix,
        deflate_constant: bool,
        want: Extreme,
        deadline: Instant,
    ) -> LanczosOutcome {
        let n = op.n();
        let dim = if deflate_constant { n.saturating_sub(1) } else { n };
        if dim == 0 {
            return LanczosOutcome {
                value: 0.0,
                iterations: 0,
                timed_out: false,
                converged: true,
            };
        }
        let max_steps = self.config.max_iterations.clamp(1, dim);

        let mut rng = rand::rngs::StdRng::seed_from_u64(self.config.seed);
        let mut q: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        if deflate_constant {
            remove_mean(&mut q);
        }
        if normalize(&mut q) == 0.0 {
            q = vec![0.0; n];
            q[0] = std::f64::consts::FRAC_1_SQRT_2;
            q[n - 1] = -std::f64::consts::FRAC_1_SQRT_2;
        }

        let mut basis: Vec<Vec<f64>> = Vec::with_capacity(max_steps);
        let mut alpha: Vec<f64> = Vec::with_capacity(max_steps);
        let mut beta: Vec<f64> = Vec::with_capacity(max_steps);
        let mut previous = f64::NAN;
        let mut timed_out = false;
        let mut converged = false;

        for step in 0..max_steps {
            if step > 0 && Instant::now() >= deadline {
                timed_out = true;
                break;
            }
            let mut w = op.mul_vec(&q);
            let a = dot(&w, &q);
            alpha.push(a);
            basis.push(q);

            // Two passes of Gram-Schmidt keep the basis orthogonal in floating point.
            for _ in 0..2 {
                for v in &basis {
                    let c = dot(&w, v);
                    axpy(&mut w, -c, v);
                }
                if deflate_constant {
                    remove_mean(&mut w);
                }
            }

            let theta = tridiagonal_extreme(&alpha, &beta, want);
            let settled = step > 0
                && (theta - previous).abs() <= self.config.tolerance * theta.abs().max(1.0);
            previous = theta;

            // A vanishing residual means the Krylov space is invariant.
            let b = normalize(&mut w);
            if settled || b <= 1e-10 * a.abs().max(1.0) {
                converged = true;
                break;
            }
            beta.push(b);
            q = w;
        }

        // A full-dimension Krylov space gives exact Ritz values.
        if !timed_out && alpha.len() == dim {
            converged = true;
        }
        let off = &beta[..alpha.len().saturating_sub(1).min(beta.len())];
        LanczosOutcome {
            value: tridiagonal_extreme(&alpha, off, want),
            iterations: alpha.len(),
            timed_out,
            converged,
        }
    }

    /// Structured record plus narrative and recommendations.
    pub fn report(&self, result: &SpectralResult) -> SpectralReport {
        report(result)
    }
}

/// Structured record plus narrative and recommendations for a result.
pub fn report(result: &SpectralResult) -> SpectralReport {
    let mut recommendations = Vec::new();
    let mut narrative = match result.condition {
        GraphCondition::Degenerate => {
            recommendations.push(
                "Ingest more relationships before drawing structural conclusions.".to_string(),
            );
            format!(
                "The graph is degenerate ({} nodes, {} edges); algebraic connectivity is reported as 0 and the graph is classed fragile.",
                result.node_count, result.edge_count
            )
        }
        GraphCondition::Disconnected { components } => {
            recommendations.push(format!(
                "Link the {} smaller component(s) to the main graph, or confirm they are separate domains.",
                components - 1
            ));
            format!(
                "The graph is disconnected into {components} components (largest holds {} of {} nodes), so λ2 = 0.",
                result.largest_component, result.node_count
            )
        }
        GraphCondition::Connected => {
            let text = format!(
                "The graph is connected with λ2 = {:.4} and λ1 = {:.4} over {} nodes and {} edges (density {:.4}); it is {}.",
                result.lambda2,
                result.lambda1,
                result.node_count,
                result.edge_count,
                result.density,
                result.class
            );
            match result.class {
                RobustnessClass::Fragile => {
                    if result.articulation_nodes.is_empty() {
                        recommendations.push(
                            "Add cross-links between weakly connected regions.".to_string(),
                        );
                    } else {
                        recommendations.push(format!(
                            "Investigate low-degree articulation nodes: {}.",
                            result.articulation_nodes.join(", ")
                        ));
                    }
                }
                RobustnessClass::Moderate => recommendations.push(
                    "Monitor connectivity; add cross-links where clusters meet through few nodes."
                        .to_string(),
                ),
                RobustnessClass::Robust => recommendations.push("No action.".to_string()),
            }
            text
        }
    };
    if result.timed_out {
        narrative.push_str(&format!(
            " The analysis hit its time budget after {} Lanczos steps; eigenvalues are partial estimates.",
            result.iterations
        ));
        recommendations.push("Raise analysis_budget_ms or run the analysis off-peak.".to_string());
    } else if !result.converged {
        narrative.push_str(&format!(
            " Lanczos stopped after {} steps without converging; λ2 is an upper estimate and the classification may be too optimistic.",
            result.iterations
        ));
        recommendations.push("Raise lanczos_max_iterations and rerun the analysis.".to_string());
    }
    SpectralReport {
        result: result.clone(),
        narrative,
        recommendations,
    }
}

fn lowest_degree_articulation(graph: &GraphMatrices, components: &Components) -> Vec<String> {
    if components.count() == 0 {
        return Vec::new();
    }
    let mut cuts = components::articulation_points(graph);
    cuts.sort_by_key(|&i| (graph.degree(i), i));
    cuts.into_iter()
        .take(MAX_LISTED_ARTICULATION)
        .filter_map(|i| graph.index.uri(i).map(str::to_string))
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn axpy(y: &mut [f64], a: f64, x: &[f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += a * xi;
    }
}

fn remove_mean(v: &mut [f64]) {
    if v.is_empty() {
        return;
    }
    let mean = v.iter().sum::<f64>() / v.len() as f64;
    for x in v.iter_mut() {
        *x -= mean;
    }
}

/// Scale to unit length, returning the original norm.
fn normalize(v: &mut [f64]) -> f64 {
    let norm = dot(v, v).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}

/// Number of eigenvalues of the tridiagonal matrix strictly below `x`.
fn sturm_count(alpha: &[f64], beta: &[f64], x: f64) -> usize {
    let mut count = 0;
    let mut d = 1.0;
    for i in 0..alpha.len() {
        let coupling = if i == 0 { 0.0 } else { beta[i - 1] * beta[i - 1] / d };
        d = alpha[i] - x - coupling;
        if d == 0.0 {
            d = -f64::EPSILON * x.abs().max(1.0);
        }
        if d < 0.0 {
            count += 1;
        }
    }
    count
}

/// Smallest or largest eigenvalue of the symmetric tridiagonal matrix with
/// diagonal `alpha` and off-diagonal `beta`.
fn tridiagonal_extreme(alpha: &[f64], beta: &[f64], want: Extreme) -> f64 {
    let k = alpha.len();
    if k == 0 {
        return 0.0;
    }
    let off = |i: usize| if i < beta.len() { beta[i].abs() } else { 0.0 };
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for i in 0..k {
        let radius = off(i) + if i > 0 { off(i - 1) } else { 0.0 };
        lo = lo.min(alpha[i] - radius);
        hi = hi.max(alpha[i] + radius);
    }
    let pad = 1e-12 * lo.abs().max(hi.abs()).max(1.0);
    lo -= pad;
    hi += pad;

    let target = match want {
        Extreme::Smallest => 1,
        Extreme::Largest => k,
    };
    let beta = &beta[..beta.len().min(k - 1)];
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if sturm_count(alpha, beta, mid) >= target {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    0.5 * (lo + hi)
}
