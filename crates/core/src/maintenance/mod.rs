//! Maintenance jobs: periodic statistics emission and retention-based
//! cleanup of old failure records.
//!
//! Both jobs run on their own intervals, independent of the download cycle.
//! Their failures are logged and never affect downloads.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::claim::{ClaimStore, StoreError, StoreStatistics};
use crate::config::{CleanupConfig, StatisticsConfig};
use crate::metrics;

/// Delete failure records older than the retention window.
pub fn run_cleanup_once(
    store: &dyn ClaimStore,
    retention_days: u32,
) -> Result<u64, StoreError> {
    let deleted = store.delete_failures_older_than(retention_days)?;
    metrics::CLEANUP_DELETED.inc_by(deleted);
    if deleted > 0 {
        info!(deleted, retention_days, "cleaned up old failure records");
    }
    Ok(deleted)
}

/// Query and log aggregate statistics over the trailing window.
pub fn log_statistics(
    store: &dyn ClaimStore,
    window_hours: u32,
) -> Result<StoreStatistics, StoreError> {
    let stats = store.query_statistics(window_hours)?;
    info!(
        window_hours,
        total_files = stats.total_files,
        succeeded = stats.succeeded,
        failed = stats.failed(),
        pending = stats.pending,
        success_rate = format!("{:.1}%", stats.success_rate()),
        bytes_stored = stats.bytes_stored,
        "download statistics"
    );
    Ok(stats)
}

/// Spawn the cleanup loop task. Returns `None` when disabled.
pub fn spawn_cleanup_loop(
    store: Arc<dyn ClaimStore>,
    config: CleanupConfig,
    shutdown: &broadcast::Sender<()>,
) -> Option<JoinHandle<()>> {
    if !config.enabled {
        info!("cleanup job disabled");
        return None;
    }

    let mut shutdown_rx = shutdown.subscribe();
    Some(tokio::spawn(async move {
        info!(
            interval_hours = config.interval_hours,
            retention_days = config.retention_days,
            "cleanup loop started"
        );
        let mut ticker = tokio::time::interval(config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = run_cleanup_once(store.as_ref(), config.retention_days) {
                        warn!(error = %e, "cleanup failed");
                    }
                }
            }
        }
        info!("cleanup loop stopped");
    }))
}

/// Spawn the statistics loop task. Returns `None` when disabled.
pub fn spawn_statistics_loop(
    store: Arc<dyn ClaimStore>,
    config: StatisticsConfig,
    shutdown: &broadcast::Sender<()>,
) -> Option<JoinHandle<()>> {
    if !config.enabled {
        info!("statistics job disabled");
        return None;
    }

    let mut shutdown_rx = shutdown.subscribe();
    Some(tokio::spawn(async move {
        info!(
            interval_hours = config.interval_hours,
            window_hours = config.window_hours,
            "statistics loop started"
        );
        let mut ticker = tokio::time::interval(config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = log_statistics(store.as_ref(), config.window_hours) {
                        warn!(error = %e, "statistics query failed");
                    }
                }
            }
        }
        info!("statistics loop stopped");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{DownloadOutcome, OutcomeStatus, SqliteClaimStore};
    use crate::testing::test_claim;
    use chrono::{Duration, Utc};

    #[test]
    fn test_run_cleanup_once_counts_deletions() {
        let store = SqliteClaimStore::in_memory().unwrap();
        let claim = test_claim("C1", &["F1"]);
        store.insert_files(&claim).unwrap();

        let old_failure = DownloadOutcome {
            finished_at: Utc::now() - Duration::days(90),
            ..DownloadOutcome::failure(
                claim.files[0].clone(),
                3,
                OutcomeStatus::TransientFailed,
                "stale",
            )
        };
        store.commit_outcomes(&[old_failure]).unwrap();

        let deleted = run_cleanup_once(&store, 30).unwrap();
        assert_eq!(deleted, 1);

        // Nothing left to delete on the next pass.
        assert_eq!(run_cleanup_once(&store, 30).unwrap(), 0);
    }

    #[test]
    fn test_log_statistics_returns_aggregates() {
        let store = SqliteClaimStore::in_memory().unwrap();
        let claim = test_claim("C1", &["F1", "F2"]);
        store.insert_files(&claim).unwrap();

        let stats = log_statistics(&store, 24).unwrap();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.pending, 2);
    }

    #[tokio::test]
    async fn test_disabled_jobs_do_not_spawn() {
        let store: Arc<dyn ClaimStore> = Arc::new(SqliteClaimStore::in_memory().unwrap());
        let (shutdown_tx, _) = broadcast::channel(1);

        let cleanup = spawn_cleanup_loop(
            Arc::clone(&store),
            CleanupConfig {
                enabled: false,
                ..Default::default()
            },
            &shutdown_tx,
        );
        assert!(cleanup.is_none());

        let stats = spawn_statistics_loop(
            store,
            StatisticsConfig {
                enabled: false,
                ..Default::default()
            },
            &shutdown_tx,
        );
        assert!(stats.is_none());
    }

    #[tokio::test]
    async fn test_loops_stop_on_shutdown() {
        let store: Arc<dyn ClaimStore> = Arc::new(SqliteClaimStore::in_memory().unwrap());
        let (shutdown_tx, _) = broadcast::channel(1);

        let cleanup =
            spawn_cleanup_loop(Arc::clone(&store), CleanupConfig::default(), &shutdown_tx)
                .unwrap();
        let stats =
            spawn_statistics_loop(store, StatisticsConfig::default(), &shutdown_tx).unwrap();

        shutdown_tx.send(()).unwrap();
        cleanup.await.unwrap();
        stats.await.unwrap();
    }
}
