//! # tierstore
//!
//! Adaptive compression and storage tiering for file objects.
//!
//! - **strategy**: fast (LZ4), balanced (Zstandard) and high-ratio (Brotli)
//!   strategies behind one trait
//! - **engine**: picks a strategy per payload and inverts any chunk by tag
//! - **storage**: active / compressed / archive tiers over a byte store,
//!   with access statistics, a batch optimizer and access-pattern analysis
//! - **maintenance**: cancellation and the periodic optimization scheduler

pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod maintenance;
pub mod storage;
pub mod strategy;
pub mod types;

pub use chunk::{ChunkMetadata, CompressedChunk};
pub use config::TieringConfig;
pub use engine::{CompressionEngine, EngineStats, PerformanceProfile, StrategyAnalysis};
pub use error::{TierError, TierResult};
pub use maintenance::{CancellationToken, OptimizationScheduler, SchedulerConfig};
pub use storage::{
    ByteStore, HybridStorage, LocalFsStore, MemoryStore, OptimizationReport, StorageTierConfig,
    Tier,
};
pub use strategy::{ChunkDecompressor, CompressionStrategy, DictionaryRegistry};
pub use types::{AccessMetadata, Algorithm, CompressionHints};
