//! Benchmarks for matrix construction and spectral analysis.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};

use ontoguard::graph::matrix;
use ontoguard::graph::spectral::SpectralAnalyzer;
use ontoguard::graph::{Entity, Relationship};

/// Random graph with a spanning path so it stays connected.
fn random_graph(n: usize, extra_edges: usize) -> (Vec<Entity>, Vec<Relationship>) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let entities: Vec<Entity> = (0..n)
        .map(|i| Entity::new(format!("kg://n/{i}"), format!("n{i}"), "Thing"))
        .collect();
    let mut rels: Vec<Relationship> = (0..n - 1)
        .map(|i| Relationship::new(format!("kg://n/{i}"), format!("kg://n/{}", i + 1), "NEXT"))
        .collect();
    for _ in 0..extra_edges {
        let a = rng.gen_range(0..n);
        let b = rng.gen_range(0..n);
        rels.push(Relationship::new(format!("kg://n/{a}"), format!("kg://n/{b}"), "LINK"));
    }
    (entities, rels)
}

fn bench_build(c: &mut Criterion) {
    let (entities, rels) = random_graph(10_000, 40_000);

    c.bench_function("build_10k_nodes", |bench| {
        bench.iter(|| black_box(matrix::build(&entities, &rels)))
    });
}

fn bench_analyze(c: &mut Criterion) {
    let (entities, rels) = random_graph(5_000, 20_000);
    let graph = matrix::build(&entities, &rels);
    let analyzer = SpectralAnalyzer::default();

    c.bench_function("fiedler_5k_nodes", |bench| {
        bench.iter(|| black_box(analyzer.analyze(&graph)))
    });
}

criterion_group!(benches, bench_build, bench_analyze);
criterion_main!(benches);
