//! Association and full-tick latency benchmarks.
//!
//! Drives a live engine with synthetic evidence at several population
//! sizes: a steady re-observation tick (the common case) and a cold
//! spawn burst (the worst case for admission).
//!
//! Run with: cargo bench --bench association

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};

use sitrep_engine::prelude::*;

fn source_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("s{i}")).collect()
}

fn observation(source: &str, tick: u64, index: usize) -> EvidenceItem {
    let anchor = index as i64 * 20_000;
    let jitter = ((tick.wrapping_mul(7).wrapping_add(index as u64)) % 1_000) as i64 - 500;
    EvidenceItem::new(source, Tick::new(tick), Position::new(anchor + jitter, jitter))
        .with_class_hint("rover")
}

fn batch_at(tick: u64, sources: &[String]) -> EvidenceBatch {
    let mut batch = EvidenceBatch::new(Tick::new(tick));
    for (index, source) in sources.iter().enumerate() {
        batch = batch.with_item(observation(source.as_str(), tick, index));
    }
    batch
}

/// Engine with `population` confirmed tracks and a drained outbox.
fn populated(population: usize) -> (Engine, Vec<String>) {
    let sources = source_names(population);
    let mut engine = Engine::builder(EngineConfig::default()).build().unwrap();
    for tick in 0..=3u64 {
        engine.submit_evidence_batch(batch_at(tick, &sources)).unwrap();
    }
    while engine.next_envelope().is_some() {}
    (engine, sources)
}

fn bench_steady_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("steady_tick");
    for &population in &[16usize, 64, 256] {
        group.throughput(Throughput::Elements(population as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(population),
            &population,
            |b, &population| {
                let (mut engine, sources) = populated(population);
                let mut tick = 4u64;
                b.iter(|| {
                    let report = engine
                        .submit_evidence_batch(batch_at(tick, &sources))
                        .unwrap();
                    while engine.next_envelope().is_some() {}
                    tick += 1;
                    black_box(report)
                });
            },
        );
    }
    group.finish();
}

fn bench_spawn_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_burst");
    for &population in &[64usize, 256] {
        group.throughput(Throughput::Elements(population as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(population),
            &population,
            |b, &population| {
                let sources = source_names(population);
                b.iter_batched(
                    || Engine::builder(EngineConfig::default()).build().unwrap(),
                    |mut engine| {
                        let report = engine.submit_evidence_batch(batch_at(0, &sources)).unwrap();
                        black_box(report)
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_steady_tick, bench_spawn_burst);
criterion_main!(benches);
