//! Harness bookkeeping benchmark suite
//!
//! Makes sure the measurement overhead stays negligible next to a render:
//! - Address generation
//! - Result aggregation and percentile lookup
//! - Table formatting

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use letter_render_bench::address;
use letter_render_bench::harness::{percentile_nanos, BenchmarkResult, PerDocumentSample};
use letter_render_bench::report::{self, extended_metrics};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

fn samples(count: usize) -> Vec<PerDocumentSample> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let name: Arc<str> = Arc::from("engine");
    (0..count)
        .map(|_| PerDocumentSample {
            engine_name: Arc::clone(&name),
            elapsed_nanos: rng.random_range(500_000..5_000_000),
            output_len: rng.random_range(20_000..60_000),
        })
        .collect()
}

fn bench_addresses(c: &mut Criterion) {
    let mut group = c.benchmark_group("address_generation");

    for count in [500, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |bencher, &count| {
            bencher.iter(|| black_box(address::generate(42, count)))
        });
    }

    group.finish();
}

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");

    for count in [500, 10_000] {
        let samples = samples(count);
        group.bench_with_input(BenchmarkId::new("from_samples", count), &samples, |bencher, samples| {
            bencher.iter(|| {
                black_box(BenchmarkResult::from_samples("engine", samples, 100, 0, 1, 0))
            })
        });

        let result = BenchmarkResult::from_samples("engine", &samples, 100, 0, 1, 0);
        group.bench_with_input(BenchmarkId::new("p99", count), &result, |bencher, result| {
            bencher.iter(|| black_box(result.percentile_ms(99.0)))
        });

        let mut sorted = result.per_document_nanos.clone();
        sorted.sort_unstable();
        group.bench_with_input(BenchmarkId::new("nearest_rank", count), &sorted, |bencher, sorted| {
            bencher.iter(|| black_box(percentile_nanos(black_box(sorted), 95.0)))
        });
    }

    group.finish();
}

fn bench_table(c: &mut Criterion) {
    let results: Vec<_> = ["markup-flow", "markup-print", "compiled-report"]
        .into_iter()
        .map(|name| BenchmarkResult::from_samples(name, &samples(500), 50, 1_000_000, 2_000_000_000, 1 << 27))
        .collect();
    let metrics = extended_metrics();

    c.bench_function("format_table", |bencher| {
        bencher.iter(|| black_box(report::format_table(black_box(&results), &metrics)))
    });
}

criterion_group!(benches, bench_addresses, bench_aggregation, bench_table);
criterion_main!(benches);
