//! Benchmarks for accumulator combine and the histogram codec

use apm_metrics_core::metrics::{DataTable, LongAvgMetrics, Metrics, MetricsMeta, PercentileMetrics};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_average_combine(c: &mut Criterion) {
    let mut group = c.benchmark_group("average_combine");

    group.bench_function("combine_delta", |b| {
        let mut metrics = LongAvgMetrics::new(MetricsMeta::new("svc", 202401011200));
        b.iter(|| metrics.combine(black_box(12), black_box(1), black_box(12), black_box(12)));
    });

    group.bench_function("merge_and_calculate", |b| {
        let mut other = LongAvgMetrics::new(MetricsMeta::new("svc", 202401011200));
        other.combine(24, 2, 14, 10);
        b.iter(|| {
            let mut metrics = LongAvgMetrics::new(MetricsMeta::new("svc", 202401011200));
            metrics.merge(black_box(&other));
            metrics.calculate()
        });
    });
    group.finish();
}

fn bench_percentile(c: &mut Criterion) {
    let mut group = c.benchmark_group("percentile");

    for buckets in [16u64, 256, 4096].iter() {
        let mut metrics = PercentileMetrics::new(MetricsMeta::new("svc", 202401011200), 10);
        for value in 0..*buckets {
            metrics.combine(value * 10);
        }
        group.bench_with_input(BenchmarkId::new("calculate", buckets), &metrics, |b, metrics| {
            b.iter(|| {
                let mut metrics = metrics.clone();
                metrics.calculate()
            });
        });
    }
    group.finish();
}

fn bench_data_table_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("data_table_codec");

    for size in [8u64, 128, 2048].iter() {
        let table: DataTable = (0..*size).map(|key| (key, (key * 7) as i64)).collect();
        let encoded = table.encode();

        group.bench_with_input(BenchmarkId::new("encode", size), &table, |b, table| {
            b.iter(|| table.encode());
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| DataTable::decode(Some(black_box(encoded.as_str()))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_average_combine, bench_percentile, bench_data_table_codec);
criterion_main!(benches);
