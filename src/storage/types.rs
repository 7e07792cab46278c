//! Storage data structures.
//!
//! Defines the tier ladder, per-path access statistics, per-tier metrics and
//! the reports produced by the optimizer and the access-pattern analyzer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::engine::EngineStats;
use crate::error::{TierError, TierResult};

const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

// ================================================================================================
// TIERS
// ================================================================================================

/// Storage tier levels, coldest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Heavily compressed sibling object
    Archive,
    /// Compressed sibling object
    Compressed,
    /// Raw bytes at the canonical path
    Active,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Archive, Tier::Compressed, Tier::Active];

    /// active(2) > compressed(1) > archive(0)
    #[inline]
    pub fn rank(&self) -> u8 {
        match self {
            Tier::Archive => 0,
            Tier::Compressed => 1,
            Tier::Active => 2,
        }
    }

    /// Suffix of the sibling object holding this tier's representation.
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Tier::Archive => Some("archive"),
            Tier::Compressed => Some("compressed"),
            Tier::Active => None,
        }
    }

    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.rank() as usize
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Archive => write!(f, "archive"),
            Tier::Compressed => write!(f, "compressed"),
            Tier::Active => write!(f, "active"),
        }
    }
}

/// Key holding `path`'s representation in `tier`.
///
/// Active data lives at the canonical path; the others at `<path>.<suffix>`.
pub fn sibling_path(path: &str, tier: Tier) -> String {
    match tier.suffix() {
        Some(suffix) => format!("{}.{}", path, suffix),
        None => path.to_string(),
    }
}

// ================================================================================================
// CONFIGURATION
// ================================================================================================

/// Tier thresholds and access-count breakpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageTierConfig {
    /// Normalized frequency at or above which a path belongs in `active`
    pub active_threshold: f64,
    /// Normalized frequency at or above which a path belongs in `compressed`
    pub compressed_threshold: f64,
    /// Lower band of the archive tier
    pub archive_threshold: f64,
    /// Access count at which a path is hot
    pub hot_access_count: u64,
    /// Access count past which an archived path is promoted on read
    pub warm_access_count: u64,
    /// Access count at or below which a path is cold
    pub cold_access_count: u64,
    /// Days without access before a path is an archiving candidate
    pub stale_after_days: u64,
    /// Long-form text above this size starts in `archive`
    pub archive_size_threshold: u64,
    /// Payloads at or below this size start in `active`
    pub small_file_threshold: u64,
}

impl Default for StorageTierConfig {
    fn default() -> Self {
        Self {
            active_threshold: 0.5,
            compressed_threshold: 0.1,
            archive_threshold: 0.02,
            hot_access_count: 50,
            warm_access_count: 10,
            cold_access_count: 2,
            stale_after_days: 30,
            archive_size_threshold: 100 * 1024,
            small_file_threshold: 16 * 1024,
        }
    }
}

impl StorageTierConfig {
    pub fn stale_after_ms(&self) -> u64 {
        self.stale_after_days.saturating_mul(MS_PER_DAY)
    }

    pub fn validate(&self) -> TierResult<()> {
        for (name, value) in [
            ("active_threshold", self.active_threshold),
            ("compressed_threshold", self.compressed_threshold),
            ("archive_threshold", self.archive_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TierError::Config {
                    message: format!("{} must be within [0, 1], got {}", name, value),
                });
            }
        }
        if self.compressed_threshold > self.active_threshold {
            return Err(TierError::Config {
                message: format!(
                    "compressed_threshold ({}) exceeds active_threshold ({})",
                    self.compressed_threshold, self.active_threshold
                ),
            });
        }
        if self.cold_access_count > self.warm_access_count
            || self.warm_access_count > self.hot_access_count
        {
            return Err(TierError::Config {
                message: format!(
                    "access breakpoints must satisfy cold <= warm <= hot, got {} / {} / {}",
                    self.cold_access_count, self.warm_access_count, self.hot_access_count
                ),
            });
        }
        Ok(())
    }
}

// ================================================================================================
// PER-PATH STATISTICS
// ================================================================================================

/// Access history and placement of one tracked path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAccessStats {
    pub access_count: u64,
    /// Unix timestamp (ms) of the latest access
    pub last_accessed: u64,
    /// Running mean of the gap between accesses (ms)
    pub average_access_interval: f64,
    /// `access_count >= hot_access_count`
    pub is_hot: bool,
    pub tier: Tier,
    /// `stored_size / original_size` of the tiered representation
    pub compression_ratio: Option<f64>,
    /// Bytes occupied by the current representation
    pub stored_size: u64,
    /// Uncompressed length
    pub original_size: u64,
}

impl Default for FileAccessStats {
    fn default() -> Self {
        Self {
            access_count: 0,
            last_accessed: 0,
            average_access_interval: 0.0,
            is_hot: false,
            tier: Tier::Active,
            compression_ratio: None,
            stored_size: 0,
            original_size: 0,
        }
    }
}

impl FileAccessStats {
    /// Stats for a path seen for the first time.
    pub fn first_access(tier: Tier, now: u64, hot_access_count: u64) -> Self {
        Self {
            access_count: 1,
            last_accessed: now,
            is_hot: 1 >= hot_access_count,
            tier,
            ..Default::default()
        }
    }

    /// Count one access at `now` and fold the gap into the running mean.
    pub fn record_access(&mut self, now: u64, hot_access_count: u64) {
        if self.access_count > 0 {
            let gap = now.saturating_sub(self.last_accessed) as f64;
            let gaps = self.access_count as f64;
            self.average_access_interval += (gap - self.average_access_interval) / gaps;
        }
        self.access_count += 1;
        self.last_accessed = now;
        self.is_hot = self.access_count >= hot_access_count;
    }

    /// Access count scaled into [0, 1].
    #[inline]
    pub fn normalized_frequency(&self) -> f64 {
        (self.access_count as f64 / 100.0).min(1.0)
    }
}

// ================================================================================================
// PER-TIER METRICS
// ================================================================================================

/// Aggregate occupancy and latency of one tier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TierMetrics {
    pub total_files: u64,
    /// Bytes stored in this tier
    pub total_size: u64,
    /// Uncompressed bytes represented by this tier
    pub total_original_size: u64,
    /// `total_size / total_original_size`
    pub compression_ratio: f64,
    /// Running mean of read latency (ms)
    pub average_access_time: f64,
    /// Fraction of original bytes saved
    pub space_efficiency: f64,
    /// Reads served from this tier
    pub accesses: u64,
}

impl TierMetrics {
    pub(crate) fn add_object(&mut self, stored: u64, original: u64) {
        self.total_files += 1;
        self.total_size += stored;
        self.total_original_size += original;
        self.refresh_ratio();
    }

    pub(crate) fn remove_object(&mut self, stored: u64, original: u64) {
        self.total_files = self.total_files.saturating_sub(1);
        self.total_size = self.total_size.saturating_sub(stored);
        self.total_original_size = self.total_original_size.saturating_sub(original);
        self.refresh_ratio();
    }

    pub(crate) fn record_read(&mut self, elapsed_ms: f64) {
        self.accesses += 1;
        self.average_access_time += (elapsed_ms - self.average_access_time) / self.accesses as f64;
    }

    fn refresh_ratio(&mut self) {
        if self.total_original_size == 0 {
            self.compression_ratio = 1.0;
            self.space_efficiency = 0.0;
        } else {
            self.compression_ratio = self.total_size as f64 / self.total_original_size as f64;
            self.space_efficiency = 1.0 - self.compression_ratio;
        }
    }
}

/// Snapshot returned by `HybridStorage::get_storage_metrics`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StorageMetrics {
    pub tiers: BTreeMap<Tier, TierMetrics>,
    pub tracked_files: usize,
    pub total_stored_size: u64,
    pub total_original_size: u64,
    pub overall_compression_ratio: f64,
    pub engine: EngineStats,
}

// ================================================================================================
// REPORTS
// ================================================================================================

/// One path the optimizer could not migrate.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MigrationFailure {
    pub path: String,
    pub from: Tier,
    pub to: Tier,
    pub error: String,
}

/// Outcome of one optimizer pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OptimizationReport {
    /// Paths examined
    pub files_processed: usize,
    /// Bytes freed; negative when migrations grew the footprint
    pub space_reclaimed: i64,
    pub files_promoted: usize,
    pub files_demoted: usize,
    pub files_failed: usize,
    pub failures: Vec<MigrationFailure>,
    /// Sum over migrated paths of `(old_stored - new_stored) / old_stored`
    pub compression_improvement: f64,
    pub duration_ms: u64,
    /// The pass stopped at a checkpoint before visiting every path
    pub cancelled: bool,
}

impl OptimizationReport {
    pub fn migrations(&self) -> usize {
        self.files_promoted + self.files_demoted
    }

    /// Turn a report with failures into `OptimizationPartialFailure`.
    pub fn into_result(self) -> TierResult<Self> {
        if self.files_failed > 0 {
            return Err(TierError::OptimizationPartialFailure {
                failed: self.files_failed,
                processed: self.files_processed,
            });
        }
        Ok(self)
    }
}

/// Disjoint migration candidate lists.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TierCandidates {
    pub for_promotion: Vec<String>,
    pub for_demotion: Vec<String>,
    /// Not accessed within the staleness window
    pub for_archiving: Vec<String>,
}

/// Result of `HybridStorage::analyze_access_patterns`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AccessPatternAnalysis {
    pub hot_files: Vec<String>,
    pub cold_files: Vec<String>,
    pub candidates: TierCandidates,
    pub recommendations: Vec<String>,
}

/// Persistable copy of the statistics table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub version: u32,
    /// Unix timestamp (ms) of the export
    pub saved_at: u64,
    pub files: BTreeMap<String, FileAccessStats>,
}

impl StatsSnapshot {
    pub const VERSION: u32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_paths() {
        assert_eq!(sibling_path("docs/a.md", Tier::Active), "docs/a.md");
        assert_eq!(sibling_path("docs/a.md", Tier::Compressed), "docs/a.md.compressed");
        assert_eq!(sibling_path("docs/a.md", Tier::Archive), "docs/a.md.archive");
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Active > Tier::Compressed);
        assert!(Tier::Compressed > Tier::Archive);
        assert_eq!(Tier::ALL.map(|t| t.rank()), [0, 1, 2]);
    }

    #[test]
    fn test_record_access_running_interval() {
        let mut stats = FileAccessStats::first_access(Tier::Active, 1_000, 3);
        assert!(!stats.is_hot);

        stats.record_access(1_100, 3);
        assert_eq!(stats.average_access_interval, 100.0);
        stats.record_access(1_400, 3);
        assert_eq!(stats.average_access_interval, 200.0);
        assert_eq!(stats.access_count, 3);
        assert!(stats.is_hot);
    }

    #[test]
    fn test_tier_metrics_ratio() {
        let mut metrics = TierMetrics::default();
        metrics.add_object(25, 100);
        metrics.add_object(25, 100);
        assert_eq!(metrics.compression_ratio, 0.25);
        assert_eq!(metrics.space_efficiency, 0.75);

        metrics.remove_object(25, 100);
        metrics.remove_object(25, 100);
        assert_eq!(metrics.total_files, 0);
        assert_eq!(metrics.compression_ratio, 1.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(StorageTierConfig::default().validate().is_ok());

        let inverted = StorageTierConfig {
            compressed_threshold: 0.8,
            ..Default::default()
        };
        assert!(matches!(inverted.validate(), Err(TierError::Config { .. })));

        let breakpoints = StorageTierConfig {
            warm_access_count: 100,
            ..Default::default()
        };
        assert!(breakpoints.validate().is_err());
    }

    #[test]
    fn test_report_into_result() {
        let clean = OptimizationReport {
            files_processed: 3,
            ..Default::default()
        };
        assert!(clean.into_result().is_ok());

        let partial = OptimizationReport {
            files_processed: 3,
            files_failed: 1,
            ..Default::default()
        };
        assert!(matches!(
            partial.into_result(),
            Err(TierError::OptimizationPartialFailure {
                failed: 1,
                processed: 3
            })
        ));
    }
}
