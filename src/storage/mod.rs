//! Tiered storage for file objects.
//!
//! Three-tier architecture:
//! - **Active**: raw bytes at the canonical key (fastest reads)
//! - **Compressed**: engine-selected chunk at `<path>.compressed`
//! - **Archive**: high-ratio chunk at `<path>.archive` (smallest footprint)
//!
//! Paths are promoted toward active as their access count grows and demoted
//! toward archive by the optimizer as they cool down.

pub mod backend;
pub mod hybrid;
pub mod optimizer;
pub mod types;

pub use backend::{ByteStore, LocalFsStore, MemoryStore, ObjectStat};
pub use hybrid::{HybridStorage, STATS_KEY};
pub use types::{
    sibling_path, AccessPatternAnalysis, FileAccessStats, MigrationFailure, OptimizationReport,
    StatsSnapshot, StorageMetrics, StorageTierConfig, Tier, TierCandidates, TierMetrics,
};
