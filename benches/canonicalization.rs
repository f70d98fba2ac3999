//! Benchmarks for the template canonicalisation hot path (spec §4.3). This
//! runs once per distinct message per scoring tick, so its cost sets the
//! floor for how many templates a single tick can process.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use logrisk_pipeline::template::canonical::{canonicalize, pattern_hash};

const SAMPLE_MESSAGES: &[&str] = &[
    "user 42 login ok",
    "connection from 10.0.0.1 refused on port 8443",
    "request 550e8400-e29b-41d4-a716-446655440000 failed after 3 retries",
    "disk usage at /var/log/app.log exceeded 90%",
    "SELECT * FROM users WHERE id IN (1, 2, 3, 4, 5) AND created_at > '2024-01-01 00:00:00'",
    "panic: runtime error: index out of range [12] with length 8",
];

fn benchmark_canonicalize_single(c: &mut Criterion) {
    c.bench_function("canonicalize_single_message", |b| {
        b.iter(|| canonicalize(black_box(SAMPLE_MESSAGES[1]), black_box(false)))
    });
}

fn benchmark_canonicalize_with_sql_normalisation(c: &mut Criterion) {
    c.bench_function("canonicalize_sql_literal_list", |b| {
        b.iter(|| canonicalize(black_box(SAMPLE_MESSAGES[4]), black_box(true)))
    });
}

fn benchmark_canonicalize_by_message_shape(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize_by_shape");
    for (i, message) in SAMPLE_MESSAGES.iter().enumerate() {
        group.bench_with_input(BenchmarkId::from_parameter(i), message, |b, message| {
            b.iter(|| canonicalize(black_box(message), black_box(false)));
        });
    }
    group.finish();
}

fn benchmark_pattern_hash(c: &mut Criterion) {
    let canonical = canonicalize(SAMPLE_MESSAGES[2], false);
    c.bench_function("pattern_hash", |b| {
        b.iter(|| pattern_hash(black_box(&canonical)))
    });
}

criterion_group!(
    benches,
    benchmark_canonicalize_single,
    benchmark_canonicalize_with_sql_normalisation,
    benchmark_canonicalize_by_message_shape,
    benchmark_pattern_hash,
);
criterion_main!(benches);
