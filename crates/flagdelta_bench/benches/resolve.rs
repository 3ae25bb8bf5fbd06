//! Delta resolution benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flagdelta_bench::full_log;
use flagdelta_core::{materialize, resolve};
use flagdelta_protocol::FeatureFilter;

/// Benchmark resolving clients at various distances from head.
fn bench_resolve_lag(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    let log = full_log(100, 2_000, 20);
    let head = log.head_revision_id();
    let all = FeatureFilter::all();

    for lag in [0u64, 1, 10, 50, 98] {
        let client = head - lag;
        group.bench_with_input(BenchmarkId::new("lag", lag), &client, |b, &client| {
            b.iter(|| {
                let resolution = resolve(black_box(&log), Some(client), &all);
                black_box(resolution);
            });
        });
    }

    group.finish();
}

/// Benchmark the cost of project and prefix filtering.
fn bench_resolve_filtered(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_filtered");
    let log = full_log(100, 2_000, 20);
    let client = log.base_revision_id();

    let filters = [
        ("all", FeatureFilter::all()),
        ("one_project", FeatureFilter::projects(["web"])),
        ("two_projects", FeatureFilter::projects(["web", "mobile"])),
        ("prefix", FeatureFilter::all().with_name_prefix("feature-001")),
    ];
    for (name, filter) in &filters {
        group.bench_with_input(BenchmarkId::new("filter", name), filter, |b, filter| {
            b.iter(|| {
                let resolution = resolve(black_box(&log), Some(client), filter);
                black_box(resolution);
            });
        });
    }

    group.finish();
}

/// Benchmark materializing the full state at head.
fn bench_materialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialize");

    for capacity in [10usize, 100] {
        let log = full_log(capacity, 2_000, 20);
        group.bench_with_input(BenchmarkId::new("capacity", capacity), &log, |b, log| {
            b.iter(|| {
                let state = materialize(black_box(log), &FeatureFilter::all());
                black_box(state);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve_lag, bench_resolve_filtered, bench_materialize);
criterion_main!(benches);
