use agisfl::federated::{fedavg, AggregationPolicy, Aggregator, ByzantineDetector};
use agisfl::privacy::NoiseInjector;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn updates(n_nodes: usize, n_params: usize) -> Vec<(String, Vec<f64>)> {
    (0..n_nodes)
        .map(|i| {
            let v = (0..n_params)
                .map(|j| ((i * n_params + j) as f64).sin())
                .collect();
            (format!("node_{}", i), v)
        })
        .collect()
}

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");
    let aggregator = Aggregator::default();

    for &n_nodes in &[10, 50, 100] {
        for &n_params in &[38usize, 1_000, 10_000] {
            let updates = updates(n_nodes, n_params);
            let id = format!("{}n_{}p", n_nodes, n_params);

            group.bench_with_input(BenchmarkId::new("fedavg", &id), &updates, |b, updates| {
                b.iter(|| fedavg(updates).unwrap())
            });

            group.bench_with_input(
                BenchmarkId::new("byzantine_tolerant", &id),
                &updates,
                |b, updates| {
                    b.iter(|| {
                        aggregator
                            .aggregate(updates, AggregationPolicy::ByzantineTolerantAveraging)
                            .unwrap()
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_detection(c: &mut Criterion) {
    let detector = ByzantineDetector::default();
    let updates = updates(100, 1_000);
    c.bench_function("detect_100n_1000p", |b| b.iter(|| detector.detect(&updates).unwrap()));
}

fn bench_noise(c: &mut Criterion) {
    let injector = NoiseInjector::new(1.0, 1e-5).unwrap();
    let vector = vec![0.5; 10_000];
    c.bench_function("laplace_10000p", |b| b.iter(|| injector.add_noise(&vector, 1.0)));
}

criterion_group!(benches, bench_aggregation, bench_detection, bench_noise);
criterion_main!(benches);
