//! Property and scenario tests for strategies, the engine and the tier policy.

use proptest::prelude::*;
use std::sync::Arc;

use tierstore::storage::FileAccessStats;
use tierstore::strategy::strategy_table;
use tierstore::{
    AccessMetadata, Algorithm, CompressedChunk, CompressionEngine, CompressionHints,
    DictionaryRegistry, HybridStorage, MemoryStore, TierError,
};

const BUDGET: usize = 8 * 1024 * 1024;

fn mime_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "application/json",
        "text/markdown",
        "text/x-rust",
        "application/octet-stream",
        "image/png",
        "",
    ])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_strategy_round_trips(
        data in prop::collection::vec(any::<u8>(), 0..4096),
        mime in mime_strategy(),
        frequency in 0.0f64..=1.0,
        hot in any::<bool>(),
    ) {
        let strategies = strategy_table(Arc::new(DictionaryRegistry::with_builtins()), true, BUDGET);
        let hints = CompressionHints::new(mime, data.len() as u64)
            .with_frequency(frequency)
            .hot(hot)
            .with_ecosystem("rust");

        for strategy in strategies.iter() {
            let mut chunk = strategy.compress(&data, &hints).unwrap();
            prop_assert_eq!(chunk.original_size, data.len() as u64);
            let restored = strategy.decompress(&mut chunk).unwrap();
            prop_assert_eq!(&restored, &data);
        }
    }

    #[test]
    fn engine_round_trips_through_envelope(
        data in prop::collection::vec(any::<u8>(), 0..4096),
        mime in mime_strategy(),
        frequency in 0.0f64..=1.0,
        hot in any::<bool>(),
    ) {
        let engine = CompressionEngine::default();
        let metadata = AccessMetadata { access_frequency: frequency, is_hot: hot, ecosystem: None };
        let chunk = engine.compress(&data, mime, &metadata).unwrap();
        let envelope = chunk.encode().unwrap();
        prop_assert_eq!(engine.decompress_bytes(&envelope).unwrap(), data);
    }

    #[test]
    fn hot_level_never_exceeds_cold_level(frequency in 0.0f64..=1.0, size in 0u64..(1 << 24)) {
        let strategies = strategy_table(Arc::new(DictionaryRegistry::empty()), false, BUDGET);
        for strategy in strategies.iter() {
            let hot = CompressionHints::new("text/plain", size).with_frequency(0.95).hot(true);
            let cold = CompressionHints::new("text/plain", size).with_frequency(0.1);
            let warm = CompressionHints::new("text/plain", size).with_frequency(frequency);
            prop_assert!(strategy.select_level(&hot) < strategy.select_level(&cold));
            prop_assert!(strategy.select_level(&hot) <= strategy.select_level(&warm));
        }
    }

    #[test]
    fn optimal_tier_is_monotonic_in_access_count(a in 0u64..500, b in 0u64..500) {
        let storage = HybridStorage::with_defaults(Arc::new(MemoryStore::new()));
        let hot_access_count = storage.config().hot_access_count;
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let stats = |count: u64| FileAccessStats {
            access_count: count,
            is_hot: count >= hot_access_count,
            ..Default::default()
        };
        prop_assert!(
            storage.calculate_optimal_tier(&stats(low)) <= storage.calculate_optimal_tier(&stats(high))
        );
    }

    #[test]
    fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = CompressedChunk::decode(&bytes);
        let mut framed = b"TCHK\x01".to_vec();
        framed.extend_from_slice(&bytes);
        let _ = CompressedChunk::decode(&framed);
    }
}

#[test]
fn test_repetitive_json_high_ratio_below_fifth() {
    let item = r#"{"user":"ada","roles":["admin","ops"],"active":true,"quota":1024}"#;
    let data = format!("[{}]", vec![item; 100].join(",")).into_bytes();

    let engine = CompressionEngine::default();
    let hints = CompressionHints::new("application/json", data.len() as u64);
    let chunk = engine
        .compress_using(Algorithm::HighRatio, &data, &hints)
        .unwrap();
    assert!(
        (chunk.compressed_size as f64) / (chunk.original_size as f64) < 0.2,
        "ratio was {}",
        chunk.ratio()
    );
}

#[test]
fn test_unknown_tag_is_fatal() {
    let engine = CompressionEngine::default();
    let hints = CompressionHints::new("text/plain", 3).hot(true);
    let chunk = engine
        .compress_using(Algorithm::Fast, b"abc", &hints)
        .unwrap();
    let mut envelope = chunk.encode().unwrap();

    // Header starts after magic, version and length; the tag is the first
    // field, a u64 length followed by its bytes.
    let tag_start = 4 + 1 + 4 + 8;
    assert_eq!(&envelope[tag_start..tag_start + 3], b"lz4");
    envelope[tag_start..tag_start + 3].copy_from_slice(b"xyz");

    let err = engine.decompress_bytes(&envelope).unwrap_err();
    assert!(matches!(err, TierError::UnknownAlgorithm { ref tag } if tag == "xyz"));
}

#[test]
fn test_mismatched_strategy_never_decodes() {
    let engine = CompressionEngine::default();
    let hints = CompressionHints::new("text/plain", 11);
    let mut chunk = engine
        .compress_using(Algorithm::Balanced, b"hello world", &hints)
        .unwrap();

    for algorithm in [Algorithm::Fast, Algorithm::HighRatio] {
        let err = engine.strategy(algorithm).decompress(&mut chunk).unwrap_err();
        assert!(matches!(err, TierError::AlgorithmMismatch { .. }));
    }
}
