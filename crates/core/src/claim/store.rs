//! Claim storage trait and query types.

use std::fmt;

use crate::claim::{Claim, DownloadOutcome, FileRef, RecentOutcome, StoreStatistics};

/// Error type for store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Database error.
    Database(String),
    /// A commit could not be applied atomically and was rolled back.
    CommitFailed(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(msg) => write!(f, "Database error: {}", msg),
            StoreError::CommitFailed(msg) => write!(f, "Commit failed: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Options governing which files count as pending during discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// When true, previously failed files are rediscovered and re-attempted
    /// on later cycles. Succeeded files are never rediscovered.
    pub retry_failed: bool,
    /// Cap on claims returned per cycle (0 = unlimited).
    pub limit: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            retry_failed: true,
            limit: 0,
        }
    }
}

/// Trait for claim tracking backends.
///
/// Discovery ordering contract: claims are returned by report date ascending,
/// then claim id ascending; files within a claim by create date ascending,
/// then file id. Claims whose every file already succeeded are excluded.
pub trait ClaimStore: Send + Sync {
    /// Register files discovered upstream. Already-known file ids are left
    /// untouched (their recorded status is the truth).
    fn insert_files(&self, claim: &Claim) -> Result<(), StoreError>;

    /// List claims that still have files to download.
    fn list_pending_claims(&self, opts: &DiscoveryOptions) -> Result<Vec<Claim>, StoreError>;

    /// Persist a batch of outcomes and the implied claim rollups atomically.
    /// On error, no outcome in the batch is applied.
    fn commit_outcomes(&self, batch: &[DownloadOutcome]) -> Result<(), StoreError>;

    /// Delete failure records older than the retention window. Returns the
    /// number of rows removed.
    fn delete_failures_older_than(&self, retention_days: u32) -> Result<u64, StoreError>;

    /// Aggregate counters over the trailing window (0 = all time).
    fn query_statistics(&self, window_hours: u32) -> Result<StoreStatistics, StoreError>;

    /// Recent activity rows, newest first.
    fn recent_outcomes(
        &self,
        window_hours: u32,
        limit: usize,
    ) -> Result<Vec<RecentOutcome>, StoreError>;

    /// Flip failed files with fewer than `max_attempts` recorded attempts
    /// back to pending. Returns the number of files reset.
    fn reset_failed_for_retry(&self, max_attempts: u32) -> Result<u64, StoreError>;

    /// Look up one file reference by id, if known.
    fn get_file(&self, file_id: &str) -> Result<Option<FileRef>, StoreError>;
}
