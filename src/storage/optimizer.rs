//! Batch tier optimizer.
//!
//! Walks tracked paths in key order and migrates each one whose optimal tier
//! differs from its current tier. The pass yields between paths and checks
//! its cancellation token at every checkpoint, so a cancelled pass leaves
//! every visited path in a consistent tier. Existing data is read without
//! counting an access, which makes back-to-back passes idempotent.
//!
//! Each migration holds the path's lock from load to commit; a concurrent
//! `read_file` or `write_file` of the same path waits for it, and the tier is
//! decided from the statistics as they stand once the lock is held.

use log::{info, warn};
use std::time::Instant;

use super::hybrid::HybridStorage;
use super::types::{MigrationFailure, OptimizationReport};
use crate::maintenance::CancellationToken;

impl HybridStorage {
    /// Run a full optimizer pass.
    pub async fn optimize_tiers(&self) -> OptimizationReport {
        self.optimize_tiers_with(&CancellationToken::new()).await
    }

    /// Run an optimizer pass that stops at the next checkpoint once `token`
    /// is cancelled.
    ///
    /// # Arguments
    /// - `token`: Checked before each path; a migration in progress completes
    ///
    /// # Returns
    /// Report of the pass. Per-path failures are recorded in the report and
    /// never abort the pass; see [`OptimizationReport::into_result`].
    pub async fn optimize_tiers_with(&self, token: &CancellationToken) -> OptimizationReport {
        let started = Instant::now();
        let mut report = OptimizationReport::default();

        for path in self.tracked_paths() {
            if token.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let lock = self.path_lock(&path);
            let guard = lock.lock().await;
            let Some(stats) = self.stats.get(&path).map(|entry| entry.value().clone()) else {
                continue;
            };
            report.files_processed += 1;

            let (from, to) = (stats.tier, self.calculate_optimal_tier(&stats));
            if from == to {
                continue;
            }

            let outcome = match self.load_representation(&path, from).await {
                Ok((data, _)) => self.migrate_with_data(&path, &data, from, to).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(migration) => {
                    if to > from {
                        report.files_promoted += 1;
                    } else {
                        report.files_demoted += 1;
                    }
                    report.space_reclaimed +=
                        migration.old_stored as i64 - migration.new_stored as i64;
                    if migration.old_stored > 0 {
                        report.compression_improvement += (migration.old_stored as f64
                            - migration.new_stored as f64)
                            / migration.old_stored as f64;
                    }
                    info!(
                        "Migrated {} from {} to {} ({} -> {} bytes)",
                        path, from, to, migration.old_stored, migration.new_stored
                    );
                }
                Err(e) => {
                    warn!("Migration of {} from {} to {} failed: {}", path, from, to, e);
                    report.files_failed += 1;
                    report.failures.push(MigrationFailure {
                        path: path.clone(),
                        from,
                        to,
                        error: e.to_string(),
                    });
                }
            }

            drop(guard);
            tokio::task::yield_now().await;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Tier optimization: {} processed, {} promoted, {} demoted, {} failed, {} bytes reclaimed in {}ms{}",
            report.files_processed,
            report.files_promoted,
            report.files_demoted,
            report.files_failed,
            report.space_reclaimed,
            report.duration_ms,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        report
    }
}
