//! Types for the batch cycle orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::claim::StoreError;

/// Errors that end a cycle abnormally.
#[derive(Debug, Error)]
pub enum CycleError {
    /// The store failed; discovery or commit could not proceed. A commit
    /// failure aborts the whole cycle rather than risking partial state.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Why a cycle stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleTermination {
    /// Every discovered claim was attempted.
    Completed,
    /// Discovery returned nothing; a no-op cycle.
    NoWork,
    /// The consecutive-failure threshold tripped; remaining claims were not
    /// attempted.
    Aborted { consecutive_failures: u32 },
    /// A shutdown signal arrived; the in-flight claim finished, the rest
    /// were left for the next cycle.
    Interrupted,
}

impl CycleTermination {
    /// Stable label for logs and the cycle counter metric.
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleTermination::Completed => "completed",
            CycleTermination::NoWork => "no_work",
            CycleTermination::Aborted { .. } => "aborted",
            CycleTermination::Interrupted => "interrupted",
        }
    }
}

/// Counters scoped to one batch cycle. Logged at cycle end, never mutated
/// afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleStats {
    pub claims_discovered: usize,
    pub claims_processed: usize,
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub bytes_downloaded: u64,
    pub batches_committed: usize,
    pub duration_ms: u64,
}

/// The result of one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub termination: CycleTermination,
    pub stats: CycleStats,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_labels() {
        assert_eq!(CycleTermination::Completed.as_str(), "completed");
        assert_eq!(CycleTermination::NoWork.as_str(), "no_work");
        assert_eq!(
            CycleTermination::Aborted {
                consecutive_failures: 5
            }
            .as_str(),
            "aborted"
        );
        assert_eq!(CycleTermination::Interrupted.as_str(), "interrupted");
    }

    #[test]
    fn test_stats_serialization() {
        let stats = CycleStats {
            claims_discovered: 4,
            claims_processed: 4,
            files_succeeded: 7,
            files_failed: 1,
            bytes_downloaded: 1024,
            batches_committed: 1,
            duration_ms: 2500,
        };
        let json = serde_json::to_string(&stats).unwrap();
        let parsed: CycleStats = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.files_succeeded, 7);
    }
}
