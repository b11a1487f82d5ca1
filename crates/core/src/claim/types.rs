//! Core claim data types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reference to one downloadable artifact belonging to a claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRef {
    /// Unique file identifier assigned by the upstream document system.
    pub file_id: String,
    /// Identifier of the owning claim.
    pub claim_id: String,
    /// Human-facing claim number, carried through for diagnostics.
    pub claim_no: String,
    /// File name as reported by the upstream system.
    pub remote_name: String,
    /// Upload date of the file; drives both the remote URL segment and the
    /// local date directory.
    pub create_date: NaiveDate,
}

impl FileRef {
    /// The remote URL path for this file, relative to the configured base URL.
    pub fn url_path(&self) -> String {
        format!(
            "/{}/{}.pdf",
            self.create_date.format("%Y%m%d"),
            urlencoding::encode(&self.file_id)
        )
    }

    /// The local file name this artifact is stored under.
    pub fn local_name(&self) -> String {
        format!("CLAIM_{}_{}.pdf", self.claim_id, self.file_id)
    }

    /// The date directory component (`YYYYMMDD`) for local storage.
    pub fn date_dir(&self) -> String {
        self.create_date.format("%Y%m%d").to_string()
    }
}

/// A unit of work: one claim and its ordered file references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: String,
    pub claim_no: String,
    /// Date the claim was reported; discovery orders claims by this, then by
    /// claim id ascending.
    pub report_date: NaiveDate,
    /// Files in stored order (create date ascending, then file id).
    pub files: Vec<FileRef>,
}

/// Final classification of one download attempt sequence for a file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Downloaded, validated, and persisted.
    Succeeded,
    /// Download completed but the payload failed size/signature validation.
    ValidationFailed,
    /// Retryable failures exhausted the attempt budget.
    TransientFailed,
    /// A non-retryable failure ended the attempt sequence early.
    FatalFailed,
}

impl OutcomeStatus {
    pub fn is_success(self) -> bool {
        matches!(self, OutcomeStatus::Succeeded)
    }

    /// Stable string form used in the store and in metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Succeeded => "succeeded",
            OutcomeStatus::ValidationFailed => "validation_failed",
            OutcomeStatus::TransientFailed => "transient_failed",
            OutcomeStatus::FatalFailed => "fatal_failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(OutcomeStatus::Succeeded),
            "validation_failed" => Some(OutcomeStatus::ValidationFailed),
            "transient_failed" => Some(OutcomeStatus::TransientFailed),
            "fatal_failed" => Some(OutcomeStatus::FatalFailed),
            _ => None,
        }
    }
}

/// Immutable record of one attempted file download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOutcome {
    pub file: FileRef,
    /// Fetch attempts consumed, including the final one.
    pub attempts: u32,
    pub status: OutcomeStatus,
    /// Byte size of the stored artifact on success.
    pub size_bytes: Option<u64>,
    /// Where the artifact was written on success.
    pub local_path: Option<PathBuf>,
    /// SHA-256 of the stored artifact on success.
    pub checksum: Option<String>,
    /// Error detail on failure.
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl DownloadOutcome {
    /// Build a failure outcome with no stored artifact.
    pub fn failure(
        file: FileRef,
        attempts: u32,
        status: OutcomeStatus,
        error: impl Into<String>,
    ) -> Self {
        Self {
            file,
            attempts,
            status,
            size_bytes: None,
            local_path: None,
            checksum: None,
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }
}

/// Aggregate status of a claim, derived from its files' recorded outcomes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Succeeded,
    PartiallySucceeded,
    Failed,
}

impl ClaimStatus {
    /// Roll up a claim status from per-file success counts.
    pub fn from_counts(succeeded: usize, total: usize) -> Self {
        if total == 0 || succeeded == 0 {
            ClaimStatus::Failed
        } else if succeeded == total {
            ClaimStatus::Succeeded
        } else {
            ClaimStatus::PartiallySucceeded
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Succeeded => "succeeded",
            ClaimStatus::PartiallySucceeded => "partially_succeeded",
            ClaimStatus::Failed => "failed",
        }
    }
}

/// Aggregate counters over a trailing window, served by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub total_files: u64,
    pub succeeded: u64,
    pub validation_failed: u64,
    pub transient_failed: u64,
    pub fatal_failed: u64,
    pub pending: u64,
    pub bytes_stored: u64,
}

impl StoreStatistics {
    pub fn failed(&self) -> u64 {
        self.validation_failed + self.transient_failed + self.fatal_failed
    }

    /// Success percentage over attempted (non-pending) files.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.succeeded + self.failed();
        if attempted == 0 {
            0.0
        } else {
            self.succeeded as f64 * 100.0 / attempted as f64
        }
    }
}

/// One row of recent download activity, for the monitor surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentOutcome {
    pub claim_no: String,
    pub file_id: String,
    pub remote_name: String,
    pub status: OutcomeStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_ref(id: &str) -> FileRef {
        FileRef {
            file_id: id.to_string(),
            claim_id: "C100".to_string(),
            claim_no: "CL-2024-100".to_string(),
            remote_name: format!("{}.pdf", id),
            create_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        }
    }

    #[test]
    fn test_url_path_uses_compact_date() {
        let file = file_ref("F42");
        assert_eq!(file.url_path(), "/20240315/F42.pdf");
    }

    #[test]
    fn test_url_path_encodes_file_id() {
        let file = file_ref("F 42");
        assert_eq!(file.url_path(), "/20240315/F%2042.pdf");
    }

    #[test]
    fn test_local_name() {
        let file = file_ref("F42");
        assert_eq!(file.local_name(), "CLAIM_C100_F42.pdf");
        assert_eq!(file.date_dir(), "20240315");
    }

    #[test]
    fn test_claim_status_rollup() {
        assert_eq!(ClaimStatus::from_counts(3, 3), ClaimStatus::Succeeded);
        assert_eq!(ClaimStatus::from_counts(0, 3), ClaimStatus::Failed);
        assert_eq!(
            ClaimStatus::from_counts(1, 3),
            ClaimStatus::PartiallySucceeded
        );
        assert_eq!(ClaimStatus::from_counts(0, 0), ClaimStatus::Failed);
    }

    #[test]
    fn test_outcome_status_round_trip() {
        for status in [
            OutcomeStatus::Succeeded,
            OutcomeStatus::ValidationFailed,
            OutcomeStatus::TransientFailed,
            OutcomeStatus::FatalFailed,
        ] {
            assert_eq!(OutcomeStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(OutcomeStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_statistics_success_rate() {
        let stats = StoreStatistics {
            total_files: 10,
            succeeded: 6,
            transient_failed: 2,
            ..Default::default()
        };
        assert_eq!(stats.failed(), 2);
        assert!((stats.success_rate() - 75.0).abs() < f64::EPSILON);

        let empty = StoreStatistics::default();
        assert_eq!(empty.success_rate(), 0.0);
    }
}
