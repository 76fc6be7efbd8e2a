use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use distconn::comm::communicator::NoComm;
use distconn::labeling::{ConnectedComponents, LabelingConfig, Optimization};

fn random_edges(vertices: u64, count: usize, seed: u64) -> Vec<(u64, u64)> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut edges = Vec::with_capacity(count * 2);
    for _ in 0..count {
        let u = rng.gen_range(0..vertices);
        let v = rng.gen_range(0..vertices);
        edges.push((u, v));
        edges.push((v, u));
    }
    edges
}

fn bench_labeling(c: &mut Criterion) {
    let mut group = c.benchmark_group("labeling");
    for &edge_count in &[10_000usize, 50_000] {
        let edges = random_edges(edge_count as u64 / 4, edge_count, 7);
        for (name, optimization) in [
            ("naive", Optimization::Naive),
            ("loadbalanced", Optimization::LoadBalanced),
        ] {
            group.bench_with_input(
                BenchmarkId::new(name, edge_count),
                &edges,
                |b, edges| {
                    b.iter(|| {
                        let mut local = edges.clone();
                        let config = LabelingConfig {
                            optimization,
                            ..Default::default()
                        };
                        let mut engine =
                            ConnectedComponents::new(&mut local, NoComm, config).unwrap();
                        engine.compute().unwrap();
                        engine.component_count().unwrap()
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_labeling);
criterion_main!(benches);
