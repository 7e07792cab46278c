//! Hybrid tiered storage.
//!
//! Every tracked path lives in exactly one tier:
//! - **active**: raw bytes at the canonical key
//! - **compressed**: a chunk envelope at `<path>.compressed`
//! - **archive**: a high-ratio chunk envelope at `<path>.archive`
//!
//! Reads and writes update per-path access statistics; the optimizer (see
//! `optimizer.rs`) migrates paths whose statistics disagree with their tier.
//! Tiered failures degrade to the canonical object instead of surfacing.
//!
//! Every operation that reads or moves a path's representation holds that
//! path's async lock, so a migration never interleaves with a read or write
//! of the same path.

use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;

use super::backend::ByteStore;
use super::types::{
    sibling_path, AccessPatternAnalysis, FileAccessStats, StatsSnapshot, StorageMetrics,
    StorageTierConfig, Tier, TierCandidates, TierMetrics,
};
use crate::chunk::CompressedChunk;
use crate::engine::CompressionEngine;
use crate::error::{TierError, TierResult};
use crate::types::{ecosystem_for_path, mime_for_path, now_ms, Algorithm, CompressionHints};

/// Key of the persisted statistics snapshot.
pub const STATS_KEY: &str = ".tierstore/stats.json";
const STATS_TMP_KEY: &str = ".tierstore/stats.json.tmp";

/// Code and config files that are read on hot paths.
const HOT_EXTENSIONS: &[&str] = &[
    "rs", "js", "mjs", "cjs", "jsx", "ts", "tsx", "py", "go", "java", "kt", "c", "h", "cc",
    "cpp", "hpp", "sh", "json", "toml", "yaml", "yml", "ini", "cfg", "conf", "env", "lock",
];

/// Long-form text that is written once and rarely re-read.
const LONG_FORM_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "log", "rst", "adoc", "csv"];

/// Stored and original sizes around one migration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Migration {
    pub old_stored: u64,
    pub new_stored: u64,
}

/// Tiered storage over a [`ByteStore`] and a [`CompressionEngine`].
pub struct HybridStorage {
    store: Arc<dyn ByteStore>,
    engine: Arc<CompressionEngine>,
    config: StorageTierConfig,
    /// Path → access statistics; entries lock independently
    pub(crate) stats: DashMap<String, FileAccessStats>,
    /// Indexed by `Tier::index`
    metrics: [Mutex<TierMetrics>; 3],
    /// Path → lock serializing representation changes
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl std::fmt::Debug for HybridStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridStorage")
            .field("config", &self.config)
            .field("tracked_files", &self.stats.len())
            .finish()
    }
}

impl HybridStorage {
    /// Create tiered storage over `store`.
    ///
    /// # Arguments
    /// - `store`: Byte store holding canonical objects and tier siblings
    /// - `engine`: Compression engine used for the compressed and archive tiers
    /// - `config`: Tier thresholds and access-count breakpoints
    ///
    /// # Example
    /// ```rust,no_run
    /// use std::sync::Arc;
    /// use tierstore::{CompressionEngine, HybridStorage, MemoryStore, StorageTierConfig};
    ///
    /// let storage = HybridStorage::new(
    ///     Arc::new(MemoryStore::new()),
    ///     Arc::new(CompressionEngine::default()),
    ///     StorageTierConfig::default(),
    /// );
    /// assert!(storage.tracked_paths().is_empty());
    /// ```
    pub fn new(
        store: Arc<dyn ByteStore>,
        engine: Arc<CompressionEngine>,
        config: StorageTierConfig,
    ) -> Self {
        Self {
            store,
            engine,
            config,
            stats: DashMap::new(),
            metrics: Default::default(),
            locks: DashMap::new(),
        }
    }

    /// Default tier config and a default engine.
    pub fn with_defaults(store: Arc<dyn ByteStore>) -> Self {
        Self::new(
            store,
            Arc::new(CompressionEngine::default()),
            StorageTierConfig::default(),
        )
    }

    pub fn config(&self) -> &StorageTierConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<CompressionEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn ByteStore> {
        &self.store
    }

    // ============================================================================================
    // READ / WRITE
    // ============================================================================================

    /// Read a path's bytes, counting the access.
    ///
    /// An archived path whose access count passes `warm_access_count` is
    /// promoted to `compressed` as a side effect.
    ///
    /// # Arguments
    /// - `path`: Canonical key of the object
    ///
    /// # Returns
    /// The original bytes, whichever tier holds them. A failed sibling read
    /// falls back to the canonical object; `TierIo` when neither exists.
    ///
    /// # Example
    /// ```rust,no_run
    /// # async fn demo(storage: &tierstore::HybridStorage) -> tierstore::TierResult<()> {
    /// storage.write_file("config.toml", b"port = 8080").await?;
    /// assert_eq!(storage.read_file("config.toml").await?, b"port = 8080");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn read_file(&self, path: &str) -> TierResult<Vec<u8>> {
        let started = Instant::now();
        let lock = self.path_lock(path);
        let _guard = lock.lock().await;

        let initial = if self.stats.contains_key(path) {
            Tier::Active
        } else {
            self.reconstruct_tier(path).await
        };
        let (stats, created) = self.touch(path, initial);
        let tier = stats.tier;

        let data = match self.read_with_fallback(path, tier, created).await {
            Ok(data) => data,
            Err(e) => {
                if created {
                    self.stats.remove(path);
                }
                return Err(e);
            }
        };

        self.metrics[tier.index()]
            .lock()
            .record_read(started.elapsed().as_secs_f64() * 1000.0);

        if tier == Tier::Archive && stats.access_count > self.config.warm_access_count {
            match self
                .migrate_with_data(path, &data, Tier::Archive, Tier::Compressed)
                .await
            {
                Ok(_) => info!(
                    "Promoted {} from archive to compressed after {} accesses",
                    path, stats.access_count
                ),
                Err(e) => warn!("Opportunistic promotion of {} failed: {}", path, e),
            }
        }

        Ok(data)
    }

    /// Write a path's bytes, counting the access.
    ///
    /// New paths are placed by [`Self::predict_initial_tier`]; known paths by
    /// their current optimal tier. A failed tiered write stores the bytes raw.
    pub async fn write_file(&self, path: &str, data: &[u8]) -> TierResult<()> {
        let lock = self.path_lock(path);
        let _guard = lock.lock().await;
        let known = self.stats.contains_key(path);
        let (stats, _) = self.touch(path, Tier::Active);
        let target = if known {
            self.calculate_optimal_tier(&stats)
        } else {
            self.predict_initial_tier(path, data.len() as u64)
        };
        let hints = self.hints_for(path, data.len() as u64, &stats);

        let placed = match self.store_representation(path, data, target, &hints).await {
            Ok(stored) => Ok((target, stored)),
            Err(e) if target != Tier::Active => {
                warn!(
                    "Degraded write of {}: {} tier failed ({}), storing raw",
                    path, target, e
                );
                self.store
                    .write(path, data)
                    .await
                    .map(|_| (Tier::Active, data.len() as u64))
                    .map_err(|raw| TierError::tier_io(path, raw))
            }
            Err(e) => Err(e),
        };

        let (tier, stored) = match placed {
            Ok(placed) => placed,
            Err(e) => {
                if !known {
                    self.stats.remove(path);
                }
                return Err(e);
            }
        };

        self.commit_placement(path, tier, stored, data.len() as u64);
        self.remove_other_representations(path, tier).await;
        debug!(
            "Wrote {} ({} bytes) to {} tier as {} bytes",
            path,
            data.len(),
            tier,
            stored
        );
        Ok(())
    }

    /// Remove a path's canonical object, both siblings and its statistics.
    pub async fn delete_file(&self, path: &str) -> TierResult<()> {
        let lock = self.path_lock(path);
        let _guard = lock.lock().await;
        let mut first_error = None;
        for tier in Tier::ALL {
            let key = sibling_path(path, tier);
            match self.store.delete(&key).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(TierError::tier_io(&key, e));
                    }
                }
            }
        }
        self.forget_path(path);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ============================================================================================
    // TIER POLICY
    // ============================================================================================

    /// Tier implied by a path's access statistics.
    ///
    /// `is_hot` always forces `active`; otherwise the normalized frequency
    /// `access_count / 100` is compared against the tier thresholds.
    pub fn calculate_optimal_tier(&self, stats: &FileAccessStats) -> Tier {
        if stats.is_hot {
            return Tier::Active;
        }
        let frequency = stats.access_count as f64 / 100.0;
        if frequency >= self.config.active_threshold {
            Tier::Active
        } else if frequency >= self.config.compressed_threshold {
            Tier::Compressed
        } else {
            Tier::Archive
        }
    }

    /// Initial tier for a path with no history.
    pub fn predict_initial_tier(&self, path: &str, size: u64) -> Tier {
        let ext = path
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        if HOT_EXTENSIONS.contains(&ext.as_str()) || size <= self.config.small_file_threshold {
            Tier::Active
        } else if LONG_FORM_EXTENSIONS.contains(&ext.as_str())
            && size > self.config.archive_size_threshold
        {
            Tier::Archive
        } else {
            Tier::Compressed
        }
    }

    // ============================================================================================
    // METRICS & ANALYSIS
    // ============================================================================================

    pub fn get_storage_metrics(&self) -> StorageMetrics {
        let tiers: BTreeMap<Tier, TierMetrics> = Tier::ALL
            .iter()
            .map(|tier| (*tier, self.metrics[tier.index()].lock().clone()))
            .collect();

        let total_stored_size: u64 = tiers.values().map(|m| m.total_size).sum();
        let total_original_size: u64 = tiers.values().map(|m| m.total_original_size).sum();
        let overall_compression_ratio = if total_original_size == 0 {
            1.0
        } else {
            total_stored_size as f64 / total_original_size as f64
        };

        StorageMetrics {
            tiers,
            tracked_files: self.stats.len(),
            total_stored_size,
            total_original_size,
            overall_compression_ratio,
            engine: self.engine.stats(),
        }
    }

    /// Bucket tracked paths by hotness and migration candidacy.
    pub fn analyze_access_patterns(&self) -> AccessPatternAnalysis {
        let now = now_ms();
        let stale_after = self.config.stale_after_ms();
        let mut analysis = AccessPatternAnalysis::default();

        for entry in self.stats.iter() {
            let (path, stats) = (entry.key(), entry.value());

            if stats.access_count >= self.config.hot_access_count {
                analysis.hot_files.push(path.clone());
            }
            if stats.access_count <= self.config.cold_access_count {
                analysis.cold_files.push(path.clone());
            }

            let stale = now.saturating_sub(stats.last_accessed) > stale_after;
            if stale {
                if stats.tier != Tier::Archive {
                    analysis.candidates.for_archiving.push(path.clone());
                }
                continue;
            }

            let optimal = self.calculate_optimal_tier(stats);
            if optimal > stats.tier {
                analysis.candidates.for_promotion.push(path.clone());
            } else if optimal < stats.tier {
                analysis.candidates.for_demotion.push(path.clone());
            }
        }

        analysis.hot_files.sort();
        analysis.cold_files.sort();
        let TierCandidates {
            for_promotion,
            for_demotion,
            for_archiving,
        } = &mut analysis.candidates;
        for_promotion.sort();
        for_demotion.sort();
        for_archiving.sort();

        analysis.recommendations = self.recommendations(&analysis);
        analysis
    }

    fn recommendations(&self, analysis: &AccessPatternAnalysis) -> Vec<String> {
        let tracked = self.stats.len();
        let candidates = &analysis.candidates;
        let mut out = Vec::new();

        if !candidates.for_archiving.is_empty() {
            out.push(format!(
                "{} file(s) have not been accessed in {} days; archive them to reclaim space",
                candidates.for_archiving.len(),
                self.config.stale_after_days
            ));
        }
        if !candidates.for_promotion.is_empty() {
            out.push(format!(
                "{} file(s) are read more often than their tier allows; promote them to cut read latency",
                candidates.for_promotion.len()
            ));
        }
        if !candidates.for_demotion.is_empty() {
            out.push(format!(
                "{} file(s) are colder than their tier; demote them to save space",
                candidates.for_demotion.len()
            ));
        }
        if tracked > 0 && analysis.hot_files.len() * 2 > tracked {
            out.push(
                "Most tracked files are hot; consider enabling prioritize_speed".to_string(),
            );
        }
        if analysis.cold_files.len() > analysis.hot_files.len().max(1) * 2 {
            out.push(
                "Cold files dominate the working set; run optimize_tiers more often".to_string(),
            );
        }
        if out.is_empty() {
            out.push("Tier placement matches current access patterns".to_string());
        }
        out
    }

    // ============================================================================================
    // STATISTICS TABLE
    // ============================================================================================

    /// Statistics for `path`; unknown paths yield defaults.
    pub fn stats_for(&self, path: &str) -> FileAccessStats {
        self.stats
            .get(path)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Tracked paths, sorted.
    pub fn tracked_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.stats.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Drop a path's statistics. The stored objects are left untouched.
    pub fn forget_path(&self, path: &str) -> Option<FileAccessStats> {
        let (_, stats) = self.stats.remove(path)?;
        if let Some((tier, stored, original)) = placement(&stats) {
            self.metrics[tier.index()].lock().remove_object(stored, original);
        }
        Some(stats)
    }

    pub fn export_stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            version: StatsSnapshot::VERSION,
            saved_at: now_ms(),
            files: self
                .stats
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }

    /// Merge a snapshot into the table, replacing entries for the same paths.
    pub fn import_stats(&self, snapshot: StatsSnapshot) -> TierResult<usize> {
        if snapshot.version > StatsSnapshot::VERSION {
            return Err(TierError::Config {
                message: format!(
                    "stats snapshot version {} is newer than supported version {}",
                    snapshot.version,
                    StatsSnapshot::VERSION
                ),
            });
        }

        let count = snapshot.files.len();
        for (path, stats) in snapshot.files {
            let added = placement(&stats);
            if let Some(previous) = self.stats.insert(path, stats) {
                if let Some((tier, stored, original)) = placement(&previous) {
                    self.metrics[tier.index()].lock().remove_object(stored, original);
                }
            }
            if let Some((tier, stored, original)) = added {
                self.metrics[tier.index()].lock().add_object(stored, original);
            }
        }
        Ok(count)
    }

    /// Persist the statistics table at [`STATS_KEY`].
    pub async fn save_stats(&self) -> TierResult<()> {
        let json = serde_json::to_vec_pretty(&self.export_stats()).map_err(io::Error::from)?;
        self.store
            .write(STATS_TMP_KEY, &json)
            .await
            .map_err(|e| TierError::tier_io(STATS_TMP_KEY, e))?;
        self.store
            .rename(STATS_TMP_KEY, STATS_KEY)
            .await
            .map_err(|e| TierError::tier_io(STATS_KEY, e))?;
        debug!("Saved statistics for {} paths", self.stats.len());
        Ok(())
    }

    /// Load a snapshot saved by [`Self::save_stats`]. Returns the number of
    /// paths loaded; a missing snapshot loads nothing.
    pub async fn load_stats(&self) -> TierResult<usize> {
        let exists = self
            .store
            .exists(STATS_KEY)
            .await
            .map_err(|e| TierError::tier_io(STATS_KEY, e))?;
        if !exists {
            return Ok(0);
        }
        let json = self
            .store
            .read(STATS_KEY)
            .await
            .map_err(|e| TierError::tier_io(STATS_KEY, e))?;
        let snapshot: StatsSnapshot = serde_json::from_slice(&json).map_err(io::Error::from)?;
        let count = self.import_stats(snapshot)?;
        info!("Loaded statistics for {} paths", count);
        Ok(count)
    }

    // ============================================================================================
    // INTERNALS
    // ============================================================================================

    /// Lock serializing reads, writes and migrations of `path`.
    pub(crate) fn path_lock(&self, path: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Count one access, creating the entry in `initial` tier if absent.
    fn touch(&self, path: &str, initial: Tier) -> (FileAccessStats, bool) {
        let now = now_ms();
        let hot_access_count = self.config.hot_access_count;
        let mut created = false;
        let entry = self
            .stats
            .entry(path.to_string())
            .and_modify(|stats| stats.record_access(now, hot_access_count))
            .or_insert_with(|| {
                created = true;
                FileAccessStats::first_access(initial, now, hot_access_count)
            });
        (entry.value().clone(), created)
    }

    /// Tier of an untracked path, from whichever sibling exists.
    async fn reconstruct_tier(&self, path: &str) -> Tier {
        for tier in [Tier::Archive, Tier::Compressed] {
            let key = sibling_path(path, tier);
            if let Ok(true) = self.store.exists(&key).await {
                debug!("Reconstructed {} tier for {}", tier, path);
                return tier;
            }
        }
        Tier::Active
    }

    pub(crate) fn hints_for(
        &self,
        path: &str,
        size: u64,
        stats: &FileAccessStats,
    ) -> CompressionHints {
        let hints = CompressionHints::new(mime_for_path(path), size)
            .with_frequency(stats.normalized_frequency())
            .hot(stats.is_hot);
        match ecosystem_for_path(path) {
            Some(ecosystem) => hints.with_ecosystem(ecosystem),
            None => hints,
        }
    }

    /// Decoded bytes of `path` in `tier`, plus the stored size.
    pub(crate) async fn load_representation(
        &self,
        path: &str,
        tier: Tier,
    ) -> TierResult<(Vec<u8>, u64)> {
        let key = sibling_path(path, tier);
        let raw = self
            .store
            .read(&key)
            .await
            .map_err(|e| TierError::tier_io(&key, e))?;
        let stored = raw.len() as u64;

        if tier == Tier::Active {
            return Ok((raw, stored));
        }
        let mut chunk = CompressedChunk::decode(&raw)?;
        let data = self.engine.decompress(&mut chunk)?;
        Ok((data, stored))
    }

    /// Read `tier`'s representation, degrading to the canonical object.
    async fn read_with_fallback(&self, path: &str, tier: Tier, created: bool) -> TierResult<Vec<u8>> {
        let e = match self.load_representation(path, tier).await {
            Ok((data, stored)) => {
                if created {
                    self.commit_placement(path, tier, stored, data.len() as u64);
                }
                return Ok(data);
            }
            Err(e) if tier == Tier::Active => return Err(e),
            Err(e) => e,
        };

        warn!(
            "Degraded read of {}: {} tier failed ({}), falling back to canonical object",
            path, tier, e
        );
        match self.store.read(path).await {
            Ok(data) => {
                if created {
                    let len = data.len() as u64;
                    self.commit_placement(path, Tier::Active, len, len);
                }
                Ok(data)
            }
            Err(raw) if e.is_object_local() => {
                warn!("Canonical fallback for {} failed: {}", path, raw);
                Err(e)
            }
            Err(raw) => Err(TierError::tier_io(path, raw)),
        }
    }

    /// Write `data` in `tier`'s representation. Returns the stored size.
    async fn store_representation(
        &self,
        path: &str,
        data: &[u8],
        tier: Tier,
        hints: &CompressionHints,
    ) -> TierResult<u64> {
        let key = sibling_path(path, tier);
        let bytes = match tier {
            Tier::Active => {
                self.store
                    .write(&key, data)
                    .await
                    .map_err(|e| TierError::tier_io(&key, e))?;
                return Ok(data.len() as u64);
            }
            Tier::Compressed => self.engine.compress_with_hints(data, hints)?.encode()?,
            Tier::Archive => {
                let cold = hints.clone().hot(false).with_frequency(0.0);
                self.engine
                    .compress_using(Algorithm::HighRatio, data, &cold)?
                    .encode()?
            }
        };

        self.store
            .write(&key, &bytes)
            .await
            .map_err(|e| TierError::tier_io(&key, e))?;
        Ok(bytes.len() as u64)
    }

    /// Move already-decoded `data` from `from` to `to`.
    ///
    /// The new representation is written before the tier switches; on failure
    /// the path stays in `from`. Callers hold the path's lock.
    pub(crate) async fn migrate_with_data(
        &self,
        path: &str,
        data: &[u8],
        from: Tier,
        to: Tier,
    ) -> TierResult<Migration> {
        let stats = self.stats_for(path);
        let hints = self.hints_for(path, data.len() as u64, &stats);

        let new_stored = match self.store_representation(path, data, to, &hints).await {
            Ok(stored) => stored,
            Err(e) => {
                if to != from {
                    self.discard(&sibling_path(path, to)).await;
                }
                return Err(e);
            }
        };

        self.commit_placement(path, to, new_stored, data.len() as u64);
        self.remove_other_representations(path, to).await;
        Ok(Migration {
            old_stored: stats.stored_size,
            new_stored,
        })
    }

    /// Record `path`'s new tier and sizes, moving it between tier metrics.
    fn commit_placement(&self, path: &str, tier: Tier, stored: u64, original: u64) {
        let previous = match self.stats.get_mut(path) {
            Some(mut entry) => {
                let previous = placement(&entry);
                entry.tier = tier;
                entry.stored_size = stored;
                entry.original_size = original;
                entry.compression_ratio = match tier {
                    Tier::Active => None,
                    _ if original == 0 => None,
                    _ => Some(stored as f64 / original as f64),
                };
                previous
            }
            None => return,
        };

        if let Some((old_tier, old_stored, old_original)) = previous {
            self.metrics[old_tier.index()]
                .lock()
                .remove_object(old_stored, old_original);
        }
        if stored > 0 || original > 0 {
            self.metrics[tier.index()].lock().add_object(stored, original);
        }
    }

    async fn remove_other_representations(&self, path: &str, keep: Tier) {
        for tier in Tier::ALL {
            if tier != keep {
                self.discard(&sibling_path(path, tier)).await;
            }
        }
    }

    /// Best-effort delete; a missing object is not an error.
    async fn discard(&self, key: &str) {
        match self.store.delete(key).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove stale object {}: {}", key, e),
        }
    }
}

/// Tier and sizes counted in the metrics for `stats`. Empty objects are not counted.
fn placement(stats: &FileAccessStats) -> Option<(Tier, u64, u64)> {
    if stats.stored_size == 0 && stats.original_size == 0 {
        None
    } else {
        Some((stats.tier, stats.stored_size, stats.original_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::MemoryStore;

    fn storage() -> (Arc<MemoryStore>, HybridStorage) {
        let store = Arc::new(MemoryStore::new());
        let hybrid = HybridStorage::with_defaults(store.clone());
        (store, hybrid)
    }

    fn stats_with_count(access_count: u64, hot_access_count: u64) -> FileAccessStats {
        FileAccessStats {
            access_count,
            is_hot: access_count >= hot_access_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_optimal_tier_thresholds() {
        let (_, hybrid) = storage();
        assert_eq!(hybrid.calculate_optimal_tier(&stats_with_count(0, 50)), Tier::Archive);
        assert_eq!(hybrid.calculate_optimal_tier(&stats_with_count(9, 50)), Tier::Archive);
        assert_eq!(hybrid.calculate_optimal_tier(&stats_with_count(10, 50)), Tier::Compressed);
        assert_eq!(hybrid.calculate_optimal_tier(&stats_with_count(49, 50)), Tier::Compressed);
        assert_eq!(hybrid.calculate_optimal_tier(&stats_with_count(50, 50)), Tier::Active);
    }

    #[test]
    fn test_hot_marker_forces_active() {
        let (_, hybrid) = storage();
        let stats = FileAccessStats {
            access_count: 1,
            is_hot: true,
            ..Default::default()
        };
        assert_eq!(hybrid.calculate_optimal_tier(&stats), Tier::Active);
    }

    #[test]
    fn test_predict_initial_tier() {
        let (_, hybrid) = storage();
        assert_eq!(hybrid.predict_initial_tier("src/lib.rs", 500_000), Tier::Active);
        assert_eq!(hybrid.predict_initial_tier("notes.md", 1_000), Tier::Active);
        assert_eq!(hybrid.predict_initial_tier("notes.md", 200 * 1024), Tier::Archive);
        assert_eq!(hybrid.predict_initial_tier("server.log", 150 * 1024), Tier::Archive);
        assert_eq!(hybrid.predict_initial_tier("notes.md", 50 * 1024), Tier::Compressed);
        assert_eq!(hybrid.predict_initial_tier("blob.bin", 50 * 1024), Tier::Compressed);
    }

    #[tokio::test]
    async fn test_write_then_read_active() {
        let (store, hybrid) = storage();
        hybrid.write_file("config.toml", b"[server]\nport = 8080\n").await.unwrap();
        assert_eq!(store.keys(), vec!["config.toml".to_string()]);

        let data = hybrid.read_file("config.toml").await.unwrap();
        assert_eq!(data, b"[server]\nport = 8080\n");

        let stats = hybrid.stats_for("config.toml");
        assert_eq!(stats.access_count, 2);
        assert_eq!(stats.tier, Tier::Active);
        assert!(stats.compression_ratio.is_none());
    }

    #[tokio::test]
    async fn test_compressed_write_replaces_canonical() {
        let (store, hybrid) = storage();
        let text = "a line of moderately repetitive prose\n".repeat(1_000);

        hybrid.write_file("notes.txt", b"seed").await.unwrap();
        hybrid.forget_path("notes.txt");
        hybrid.write_file("notes.txt", text.as_bytes()).await.unwrap();

        assert_eq!(store.keys(), vec!["notes.txt.compressed".to_string()]);
        let stats = hybrid.stats_for("notes.txt");
        assert_eq!(stats.tier, Tier::Compressed);
        assert!(stats.compression_ratio.unwrap() < 0.5);
        assert_eq!(hybrid.read_file("notes.txt").await.unwrap(), text.as_bytes());
    }

    #[tokio::test]
    async fn test_failed_sibling_write_falls_back_to_raw() {
        let (store, hybrid) = storage();
        let text = "x".repeat(40 * 1024);
        store.fail_on("big.txt.compressed");

        hybrid.write_file("big.txt", text.as_bytes()).await.unwrap();
        assert_eq!(hybrid.stats_for("big.txt").tier, Tier::Active);
        assert!(store.exists("big.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_untracked_path_is_reconstructed() {
        let (store, hybrid) = storage();
        let text = "reconstruct me ".repeat(5_000);
        hybrid.write_file("doc.txt", text.as_bytes()).await.unwrap();
        assert_eq!(hybrid.stats_for("doc.txt").tier, Tier::Compressed);

        hybrid.forget_path("doc.txt");
        assert_eq!(hybrid.stats_for("doc.txt"), FileAccessStats::default());

        assert_eq!(hybrid.read_file("doc.txt").await.unwrap(), text.as_bytes());
        let stats = hybrid.stats_for("doc.txt");
        assert_eq!(stats.tier, Tier::Compressed);
        assert_eq!(stats.access_count, 1);
        assert_eq!(
            stats.stored_size,
            store.stat("doc.txt.compressed").await.unwrap().size
        );
    }

    #[tokio::test]
    async fn test_untracked_canonical_fallback_is_placed_active() {
        let (store, hybrid) = storage();
        store.write("doc.txt.compressed", b"not an envelope").await.unwrap();
        store.write("doc.txt", b"canonical body").await.unwrap();

        assert_eq!(hybrid.read_file("doc.txt").await.unwrap(), b"canonical body");
        let stats = hybrid.stats_for("doc.txt");
        assert_eq!(stats.tier, Tier::Active);
        assert_eq!(stats.stored_size, 14);
        assert_eq!(stats.original_size, 14);

        let metrics = hybrid.get_storage_metrics();
        assert_eq!(metrics.tiers[&Tier::Active].total_files, 1);
        assert_eq!(metrics.tiers[&Tier::Active].total_size, 14);
        assert_eq!(metrics.tiers[&Tier::Compressed].total_files, 0);
    }

    #[tokio::test]
    async fn test_delete_file_removes_everything() {
        let (store, hybrid) = storage();
        hybrid
            .write_file("doc.txt", "delete me ".repeat(5_000).as_bytes())
            .await
            .unwrap();
        store.write("doc.txt.archive", b"stale").await.unwrap();

        hybrid.delete_file("doc.txt").await.unwrap();
        assert!(store.is_empty());
        assert!(hybrid.tracked_paths().is_empty());
        assert_eq!(hybrid.get_storage_metrics().total_stored_size, 0);
    }

    #[tokio::test]
    async fn test_metrics_follow_placement() {
        let (_, hybrid) = storage();
        hybrid.write_file("a.rs", b"fn main() {}").await.unwrap();
        hybrid
            .write_file("b.txt", "compress me please ".repeat(2_000).as_bytes())
            .await
            .unwrap();
        hybrid.read_file("b.txt").await.unwrap();

        let metrics = hybrid.get_storage_metrics();
        assert_eq!(metrics.tracked_files, 2);
        assert_eq!(metrics.tiers[&Tier::Active].total_files, 1);
        assert_eq!(metrics.tiers[&Tier::Compressed].total_files, 1);
        assert_eq!(metrics.tiers[&Tier::Compressed].accesses, 1);
        assert!(metrics.tiers[&Tier::Compressed].space_efficiency > 0.5);
        assert!(metrics.overall_compression_ratio < 1.0);
        assert_eq!(metrics.engine.total_compressions, 1);
    }

    #[test]
    fn test_snapshot_import_replaces_entries() {
        let (_, hybrid) = storage();
        let mut files = BTreeMap::new();
        files.insert(
            "a.txt".to_string(),
            FileAccessStats {
                access_count: 7,
                tier: Tier::Compressed,
                stored_size: 10,
                original_size: 40,
                ..Default::default()
            },
        );
        let snapshot = StatsSnapshot {
            version: StatsSnapshot::VERSION,
            saved_at: 0,
            files,
        };

        assert_eq!(hybrid.import_stats(snapshot.clone()).unwrap(), 1);
        assert_eq!(hybrid.import_stats(snapshot).unwrap(), 1);
        let metrics = hybrid.get_storage_metrics();
        assert_eq!(metrics.tiers[&Tier::Compressed].total_files, 1);
        assert_eq!(metrics.tiers[&Tier::Compressed].compression_ratio, 0.25);

        let future = StatsSnapshot {
            version: StatsSnapshot::VERSION + 1,
            ..Default::default()
        };
        assert!(hybrid.import_stats(future).is_err());
    }
}
