//! Compression engine.
//!
//! Owns the strategy table and a performance profile, picks a strategy per
//! payload, and keeps path-agnostic usage counters. Decompression dispatches
//! purely on the chunk's algorithm tag.

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::chunk::CompressedChunk;
use crate::error::TierResult;
use crate::strategy::{strategy_table, ChunkDecompressor, CompressionStrategy, DictionaryRegistry};
use crate::types::{AccessMetadata, Algorithm, CompressionHints};

// ================================================================================================
// PROFILE
// ================================================================================================

/// Engine-wide tuning knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceProfile {
    /// Pick the fastest applicable strategy regardless of ratio
    pub prioritize_speed: bool,
    /// Bind ecosystem dictionaries when compressing
    pub enable_dictionary: bool,
    /// Soft ceiling (bytes) for codec block and window sizes
    pub max_memory_usage: usize,
}

impl Default for PerformanceProfile {
    fn default() -> Self {
        Self {
            prioritize_speed: false,
            enable_dictionary: true,
            max_memory_usage: 64 * 1024 * 1024,
        }
    }
}

// ================================================================================================
// ANALYSIS & STATISTICS
// ================================================================================================

/// One candidate's estimated `compressed / original`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StrategyEstimate {
    pub algorithm: Algorithm,
    pub estimated_ratio: f64,
}

/// Result of ranking strategies for a payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StrategyAnalysis {
    /// Candidates, best estimated ratio first
    pub estimations: Vec<StrategyEstimate>,
    pub recommended_strategy: Algorithm,
    /// True when no strategy claimed the payload and all were considered
    pub fallback: bool,
}

/// Aggregate, path-agnostic usage counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EngineStats {
    pub total_compressions: u64,
    pub total_decompressions: u64,
    pub failed_decompressions: u64,
    pub total_bytes_processed: u64,
    /// Signed: incompressible input can grow
    pub total_bytes_saved: i64,
    pub average_compression_ratio: f64,
    pub strategy_usage: BTreeMap<Algorithm, u64>,
}

impl EngineStats {
    fn record_compression(&mut self, chunk: &CompressedChunk) {
        self.total_compressions += 1;
        self.total_bytes_processed += chunk.original_size;
        self.total_bytes_saved += chunk.original_size as i64 - chunk.compressed_size as i64;
        self.average_compression_ratio +=
            (chunk.ratio() - self.average_compression_ratio) / self.total_compressions as f64;
        *self.strategy_usage.entry(chunk.algorithm).or_insert(0) += 1;
    }
}

// ================================================================================================
// ENGINE
// ================================================================================================

/// Chooses, applies and inverts compression strategies.
pub struct CompressionEngine {
    /// Indexed by `Algorithm::index`
    strategies: [Arc<dyn CompressionStrategy>; 3],
    profile: PerformanceProfile,
    dictionaries: Arc<DictionaryRegistry>,
    stats: Mutex<EngineStats>,
}

impl std::fmt::Debug for CompressionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionEngine")
            .field("profile", &self.profile)
            .field("dictionaries", &self.dictionaries.len())
            .finish()
    }
}

impl Default for CompressionEngine {
    fn default() -> Self {
        Self::new(PerformanceProfile::default())
    }
}

impl CompressionEngine {
    /// Engine with the built-in ecosystem dictionaries.
    pub fn new(profile: PerformanceProfile) -> Self {
        Self::with_dictionaries(profile, DictionaryRegistry::with_builtins())
    }

    pub fn with_dictionaries(profile: PerformanceProfile, dictionaries: DictionaryRegistry) -> Self {
        let dictionaries = Arc::new(dictionaries);
        let strategies = strategy_table(
            Arc::clone(&dictionaries),
            profile.enable_dictionary,
            profile.max_memory_usage,
        );
        Self {
            strategies,
            profile,
            dictionaries,
            stats: Mutex::new(EngineStats::default()),
        }
    }

    pub fn profile(&self) -> &PerformanceProfile {
        &self.profile
    }

    /// Strategy registered for an algorithm.
    pub fn strategy(&self, algorithm: Algorithm) -> &Arc<dyn CompressionStrategy> {
        &self.strategies[algorithm.index()]
    }

    /// Rank strategies for `data` given a content type and access metadata.
    pub fn analyze_optimal_strategy(
        &self,
        data: &[u8],
        mime_type: &str,
        metadata: &AccessMetadata,
    ) -> StrategyAnalysis {
        let hints = CompressionHints::from_metadata(mime_type, data.len() as u64, metadata);
        self.analyze(data, &hints)
    }

    /// Rank strategies for fully specified hints.
    pub fn analyze(&self, data: &[u8], hints: &CompressionHints) -> StrategyAnalysis {
        let applicable: Vec<&Arc<dyn CompressionStrategy>> = self
            .strategies
            .iter()
            .filter(|strategy| strategy.should_use(data, hints))
            .collect();

        let fallback = applicable.is_empty();
        let candidates: Vec<&Arc<dyn CompressionStrategy>> = if fallback {
            self.strategies.iter().collect()
        } else {
            applicable
        };

        let mut estimations: Vec<StrategyEstimate> = candidates
            .iter()
            .map(|strategy| StrategyEstimate {
                algorithm: strategy.algorithm(),
                estimated_ratio: strategy.estimate_ratio(data, hints),
            })
            .collect();
        estimations.sort_by(|a, b| by_ratio_then_speed(a, b));

        let recommended_strategy = if self.profile.prioritize_speed {
            estimations
                .iter()
                .map(|e| e.algorithm)
                .min_by_key(|algorithm| algorithm.speed_rank())
        } else {
            estimations.first().map(|e| e.algorithm)
        }
        .unwrap_or(Algorithm::Balanced);

        StrategyAnalysis {
            estimations,
            recommended_strategy,
            fallback,
        }
    }

    /// Compress with the recommended strategy.
    pub fn compress(
        &self,
        data: &[u8],
        mime_type: &str,
        metadata: &AccessMetadata,
    ) -> TierResult<CompressedChunk> {
        let hints = CompressionHints::from_metadata(mime_type, data.len() as u64, metadata);
        self.compress_with_hints(data, &hints)
    }

    pub fn compress_with_hints(
        &self,
        data: &[u8],
        hints: &CompressionHints,
    ) -> TierResult<CompressedChunk> {
        let analysis = self.analyze(data, hints);
        debug!(
            "selected {} for {} bytes of {} (fallback: {})",
            analysis.recommended_strategy,
            data.len(),
            hints.mime_type,
            analysis.fallback
        );
        self.compress_using(analysis.recommended_strategy, data, hints)
    }

    /// Compress with a specific strategy, bypassing analysis.
    pub fn compress_using(
        &self,
        algorithm: Algorithm,
        data: &[u8],
        hints: &CompressionHints,
    ) -> TierResult<CompressedChunk> {
        let chunk = self.strategy(algorithm).compress(data, hints)?;
        self.stats.lock().record_compression(&chunk);
        Ok(chunk)
    }

    /// Invert a chunk. Dispatches on `chunk.algorithm` only.
    pub fn decompress(&self, chunk: &mut CompressedChunk) -> TierResult<Vec<u8>> {
        let result = self.strategy(chunk.algorithm).decompress(chunk);
        let mut stats = self.stats.lock();
        match result {
            Ok(data) => {
                stats.total_decompressions += 1;
                Ok(data)
            }
            Err(e) => {
                stats.failed_decompressions += 1;
                Err(e)
            }
        }
    }

    /// Decode an envelope and invert it. An unrecognised tag is `UnknownAlgorithm`.
    pub fn decompress_bytes(&self, envelope: &[u8]) -> TierResult<Vec<u8>> {
        let mut chunk = match CompressedChunk::decode(envelope) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.stats.lock().failed_decompressions += 1;
                return Err(e);
            }
        };
        self.decompress(&mut chunk)
    }

    /// Incremental decoder from the owning strategy.
    pub fn create_decompressor(
        &self,
        chunk: CompressedChunk,
    ) -> TierResult<ChunkDecompressor<'static>> {
        self.strategy(chunk.algorithm).create_decompressor(chunk)
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.lock().clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = EngineStats::default();
    }
}

fn by_ratio_then_speed(a: &StrategyEstimate, b: &StrategyEstimate) -> Ordering {
    a.estimated_ratio
        .total_cmp(&b.estimated_ratio)
        .then_with(|| a.algorithm.speed_rank().cmp(&b.algorithm.speed_rank()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkMetadata;
    use crate::error::TierError;

    fn cold() -> AccessMetadata {
        AccessMetadata::default()
    }

    #[test]
    fn test_analysis_ranks_by_ratio() {
        let engine = CompressionEngine::default();
        let data = vec![b'a'; 4096];
        let metadata = AccessMetadata {
            access_frequency: 0.5,
            ..Default::default()
        };

        let analysis = engine.analyze_optimal_strategy(&data, "application/json", &metadata);
        assert!(!analysis.fallback);
        assert_eq!(analysis.recommended_strategy, Algorithm::HighRatio);
        let algorithms: Vec<Algorithm> = analysis.estimations.iter().map(|e| e.algorithm).collect();
        assert_eq!(algorithms, vec![Algorithm::HighRatio, Algorithm::Balanced]);
    }

    #[test]
    fn test_prioritize_speed_picks_fastest_applicable() {
        let engine = CompressionEngine::new(PerformanceProfile {
            prioritize_speed: true,
            ..Default::default()
        });
        let data = vec![b'a'; 4096];
        let metadata = AccessMetadata {
            access_frequency: 0.5,
            ..Default::default()
        };

        let analysis = engine.analyze_optimal_strategy(&data, "application/json", &metadata);
        assert_eq!(analysis.recommended_strategy, Algorithm::Balanced);

        let hot = AccessMetadata {
            is_hot: true,
            ..Default::default()
        };
        let analysis = engine.analyze_optimal_strategy(&data, "application/json", &hot);
        assert_eq!(analysis.recommended_strategy, Algorithm::Fast);
    }

    #[test]
    fn test_falls_back_to_all_strategies() {
        let engine = CompressionEngine::default();
        let data = vec![0u8; 256];
        // Small, cold, opaque binary: nobody claims it.
        let analysis =
            engine.analyze_optimal_strategy(&data, "application/octet-stream", &cold());
        assert!(analysis.fallback);
        assert_eq!(analysis.estimations.len(), 3);
        assert_eq!(analysis.recommended_strategy, Algorithm::HighRatio);
    }

    #[test]
    fn test_compress_updates_stats() {
        let engine = CompressionEngine::default();
        let data = b"tiered storage ".repeat(200);

        let mut chunk = engine.compress(&data, "text/plain", &cold()).unwrap();
        let stats = engine.stats();
        assert_eq!(stats.total_compressions, 1);
        assert_eq!(stats.total_bytes_processed, data.len() as u64);
        assert!(stats.total_bytes_saved > 0);
        assert!((stats.average_compression_ratio - chunk.ratio()).abs() < 1e-9);
        assert_eq!(stats.strategy_usage.get(&chunk.algorithm), Some(&1));

        assert_eq!(engine.decompress(&mut chunk).unwrap(), data);
        assert_eq!(engine.stats().total_decompressions, 1);

        engine.reset_stats();
        assert_eq!(engine.stats(), EngineStats::default());
    }

    #[test]
    fn test_degenerate_payloads() {
        let engine = CompressionEngine::default();

        let mut empty = engine.compress(&[], "text/plain", &cold()).unwrap();
        assert_eq!(empty.original_size, 0);
        assert!(engine.decompress(&mut empty).unwrap().is_empty());

        let mut single = engine.compress(&[9], "text/plain", &cold()).unwrap();
        assert_eq!(single.original_size, 1);
        assert!(single.compressed_size >= 1);
        assert_eq!(engine.decompress(&mut single).unwrap(), vec![9]);
        assert!(engine.stats().total_bytes_saved < 0);
    }

    #[test]
    fn test_unknown_algorithm_never_returns_bytes() {
        let engine = CompressionEngine::default();
        let chunk = CompressedChunk::new(
            Algorithm::Fast,
            3,
            b"abc".to_vec(),
            ChunkMetadata::default(),
        );
        let envelope = chunk.encode_with_tag("unknown");

        let err = engine.decompress_bytes(&envelope).unwrap_err();
        assert!(matches!(err, TierError::UnknownAlgorithm { ref tag } if tag == "unknown"));
        assert_eq!(engine.stats().failed_decompressions, 1);
    }

    #[test]
    fn test_envelope_round_trip_through_engine() {
        let engine = CompressionEngine::default();
        let data = br#"{"k":"v","n":[1,2,3]}"#.repeat(40);
        let chunk = engine
            .compress(&data, "application/json", &cold())
            .unwrap();
        let envelope = chunk.encode().unwrap();
        assert_eq!(engine.decompress_bytes(&envelope).unwrap(), data);

        let streamed: Vec<u8> = engine
            .create_decompressor(chunk)
            .unwrap()
            .collect::<TierResult<Vec<Vec<u8>>>>()
            .unwrap()
            .concat();
        assert_eq!(streamed, data);
    }
}
