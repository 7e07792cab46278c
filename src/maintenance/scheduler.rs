//! Scheduled tier optimization - background task for periodic optimizer passes.
//!
//! Each tick runs one explicit, checkpointable `optimize_tiers_with` pass and
//! optionally persists the statistics table afterwards. The loop exits once
//! its cancellation token is cancelled; a pass already in progress stops at
//! its next checkpoint.

use log::{error, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use super::CancellationToken;
use crate::storage::{HybridStorage, OptimizationReport};
use crate::types::now_ms;

/// Configuration for the optimization scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between optimizer passes
    pub interval_secs: u64,
    /// Whether the scheduler runs at all
    pub enabled: bool,
    /// Save the statistics snapshot after every pass
    pub persist_stats: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60 * 60,
            enabled: true,
            persist_stats: true,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Runs optimizer passes over one [`HybridStorage`] on a fixed interval.
pub struct OptimizationScheduler {
    storage: Arc<HybridStorage>,
    config: SchedulerConfig,
    token: CancellationToken,
    /// Timestamp of the last completed pass
    last_run_at: Arc<RwLock<u64>>,
    last_report: RwLock<Option<OptimizationReport>>,
}

impl OptimizationScheduler {
    /// Creates a new optimization scheduler.
    ///
    /// # Arguments
    /// - `storage`: Arc-wrapped storage whose tiers are optimized
    /// - `config`: Interval, enabled state and whether to persist statistics
    ///
    /// # Returns
    /// A scheduler with `last_run_at` initialized to the current time and a
    /// fresh cancellation token.
    ///
    /// # Example
    /// ```rust,no_run
    /// use std::sync::Arc;
    /// use tierstore::{HybridStorage, MemoryStore, OptimizationScheduler, SchedulerConfig};
    ///
    /// let storage = Arc::new(HybridStorage::with_defaults(Arc::new(MemoryStore::new())));
    /// let config = SchedulerConfig {
    ///     interval_secs: 15 * 60,
    ///     ..Default::default()
    /// };
    /// let scheduler = Arc::new(OptimizationScheduler::new(storage, config));
    /// # let _ = scheduler;
    /// ```
    pub fn new(storage: Arc<HybridStorage>, config: SchedulerConfig) -> Self {
        Self {
            storage,
            config,
            token: CancellationToken::new(),
            last_run_at: Arc::new(RwLock::new(now_ms())),
            last_report: RwLock::new(None),
        }
    }

    /// Timestamp of the last completed pass, or construction time.
    pub fn last_run(&self) -> u64 {
        *self.last_run_at.read()
    }

    pub fn last_report(&self) -> Option<OptimizationReport> {
        self.last_report.read().clone()
    }

    /// Token that stops the loop (and the pass in progress) when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Run passes until stopped. Returns immediately when disabled.
    pub async fn start(self: Arc<Self>) {
        if !self.config.enabled {
            info!("Scheduled optimization is disabled, skipping");
            return;
        }

        info!(
            "Starting scheduled optimization with {}-second interval",
            self.config.interval_secs
        );

        let mut ticker = interval(self.config.interval().max(Duration::from_millis(1)));

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.token.cancelled() => break,
            }
            self.run_once().await;
            if self.token.is_cancelled() {
                break;
            }
        }

        info!("Scheduled optimization stopped");
    }

    /// Execute one pass and record its outcome.
    pub async fn run_once(&self) -> OptimizationReport {
        let report = self.storage.optimize_tiers_with(&self.token).await;

        if report.files_failed > 0 {
            error!(
                "Scheduled optimization: {} of {} paths failed to migrate",
                report.files_failed, report.files_processed
            );
        }

        if self.config.persist_stats {
            if let Err(e) = self.storage.save_stats().await {
                error!("Failed to persist statistics after optimization: {}", e);
            }
        }

        *self.last_run_at.write() = now_ms();
        *self.last_report.write() = Some(report.clone());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ByteStore, MemoryStore, Tier, STATS_KEY};

    fn scheduler(config: SchedulerConfig) -> (Arc<MemoryStore>, Arc<OptimizationScheduler>) {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(HybridStorage::with_defaults(store.clone()));
        (store, Arc::new(OptimizationScheduler::new(storage, config)))
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert!(config.enabled);
        assert!(config.persist_stats);
        assert_eq!(config.interval().as_secs(), 3600);
    }

    #[tokio::test]
    async fn test_run_once_records_report_and_persists() {
        let (store, scheduler) = scheduler(SchedulerConfig::default());
        scheduler
            .storage
            .write_file("a.txt", b"tiny")
            .await
            .unwrap();

        let before = scheduler.last_run();
        let report = scheduler.run_once().await;
        assert_eq!(report.files_demoted, 1);
        assert!(scheduler.last_run() >= before);
        assert_eq!(scheduler.last_report(), Some(report));
        assert!(store.exists(STATS_KEY).await.unwrap());
        assert_eq!(scheduler.storage.stats_for("a.txt").tier, Tier::Archive);
    }

    #[tokio::test]
    async fn test_disabled_scheduler_returns() {
        let (_, scheduler) = scheduler(SchedulerConfig {
            enabled: false,
            ..Default::default()
        });
        tokio::time::timeout(Duration::from_secs(1), scheduler.clone().start())
            .await
            .unwrap();
        assert!(scheduler.last_report().is_none());
    }

    #[tokio::test]
    async fn test_stop_ends_loop() {
        let (_, scheduler) = scheduler(SchedulerConfig {
            interval_secs: 3600,
            ..Default::default()
        });
        let handle = tokio::spawn(scheduler.clone().start());

        // First tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(scheduler.last_report().is_some());
    }
}
