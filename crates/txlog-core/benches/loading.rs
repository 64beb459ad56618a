//! Benchmark for table loading and timestamp normalization
//! Run: cargo bench -p txlog-core --bench loading

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use txlog_core::{load, parse_timestamp, RawTable};

// Sample timestamps for benchmarking
const NAIVE_TS: &str = "2024-02-10 14:30:45";
const RFC3339_TS: &str = "2024-02-10T14:30:45.123+02:00";
const BAD_TS: &str = "10th of February";

fn bench_parse_timestamp(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_timestamp");

    group.bench_function("naive", |b| b.iter(|| parse_timestamp(black_box(NAIVE_TS))));
    group.bench_function("rfc3339", |b| b.iter(|| parse_timestamp(black_box(RFC3339_TS))));
    group.bench_function("rejected", |b| b.iter(|| parse_timestamp(black_box(BAD_TS))));

    group.finish();
}

fn sample_table(rows: usize) -> RawTable {
    let headers = vec!["timestamp".to_string(), "level".to_string(), "message".to_string()];
    let rows = (0..rows)
        .map(|i| {
            let (level, message) = if i % 3 == 0 {
                ("ERROR", "Timeout on the payment gateway API.")
            } else {
                ("INFO", "Payment processed successfully.")
            };
            vec![
                format!("2024-02-10 {:02}:{:02}:{:02}", (i / 3600) % 24, (i / 60) % 60, i % 60),
                level.to_string(),
                message.to_string(),
            ]
        })
        .collect();
    RawTable::new(headers, rows)
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");

    for size in [100, 1_000, 10_000] {
        let raw = sample_table(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("rows", size), &raw, |b, raw| {
            b.iter(|| load(black_box(raw)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_timestamp, bench_load);
criterion_main!(benches);
