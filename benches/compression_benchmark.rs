//! Criterion benchmarks for tierstore.
//!
//! - Per-strategy compress / decompress of structured text (64 KiB)
//! - Engine strategy analysis (no compression)
//! - Active-tier read through `HybridStorage`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use tierstore::strategy::strategy_table;
use tierstore::{
    AccessMetadata, Algorithm, CompressionEngine, CompressionHints, DictionaryRegistry,
    HybridStorage, MemoryStore,
};

fn structured_payload(size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(size);
    let mut i = 0u64;
    while out.len() < size {
        out.extend_from_slice(
            format!(
                r#"{{"id":{},"service":"api-{}","latency_ms":{},"ok":{}}},"#,
                i,
                i % 13,
                (i * 37) % 500,
                i % 7 != 0
            )
            .as_bytes(),
        );
        i += 1;
    }
    out.truncate(size);
    out
}

fn bench_strategies(c: &mut Criterion) {
    let data = structured_payload(64 * 1024);
    let strategies = strategy_table(
        Arc::new(DictionaryRegistry::with_builtins()),
        true,
        64 * 1024 * 1024,
    );

    let mut group = c.benchmark_group("strategy");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for (label, hints) in [
        ("hot", CompressionHints::new("application/json", data.len() as u64).hot(true)),
        (
            "cold",
            CompressionHints::new("application/json", data.len() as u64).with_frequency(0.05),
        ),
    ] {
        for strategy in strategies.iter() {
            let id = format!("{}/{}", strategy.algorithm(), label);
            group.bench_with_input(BenchmarkId::new("compress", &id), &data, |b, data| {
                b.iter(|| strategy.compress(black_box(data), &hints))
            });

            if let Ok(chunk) = strategy.compress(&data, &hints) {
                group.bench_with_input(BenchmarkId::new("decompress", &id), &chunk, |b, chunk| {
                    b.iter(|| {
                        let mut chunk = chunk.clone();
                        strategy.decompress(black_box(&mut chunk))
                    })
                });
            }
        }
    }
    group.finish();
}

fn bench_analysis(c: &mut Criterion) {
    let engine = CompressionEngine::default();
    let data = structured_payload(16 * 1024);
    let metadata = AccessMetadata {
        access_frequency: 0.5,
        ..Default::default()
    };

    c.bench_function("engine/analyze_optimal_strategy", |b| {
        b.iter(|| engine.analyze_optimal_strategy(black_box(&data), "application/json", &metadata))
    });

    let hints = CompressionHints::new("application/json", data.len() as u64);
    c.bench_function("engine/compress_balanced_16k", |b| {
        b.iter(|| engine.compress_using(Algorithm::Balanced, black_box(&data), &hints))
    });
}

fn bench_hybrid_read(c: &mut Criterion) {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => panic!("tokio runtime: {}", e),
    };
    let storage = HybridStorage::with_defaults(Arc::new(MemoryStore::new()));
    let data = structured_payload(8 * 1024);
    if let Err(e) = runtime.block_on(storage.write_file("bench/config.json", &data)) {
        panic!("seed write failed: {}", e);
    }

    c.bench_function("hybrid/read_active_8k", |b| {
        b.iter(|| runtime.block_on(storage.read_file(black_box("bench/config.json"))))
    });
}

criterion_group!(benches, bench_strategies, bench_analysis, bench_hybrid_read);
criterion_main!(benches);
