//! Claim processor: turns one claim into a sequence of rate-limited,
//! retried, validated downloads, producing one outcome per file.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::claim::{Claim, ClaimStatus, DownloadOutcome, FileRef, OutcomeStatus};
use crate::config::DownloadConfig;
use crate::download::{ArtifactValidator, Fetcher, RateLimiter, RetryPolicy};
use crate::metrics;
use crate::storage::FsArtifactStore;

/// Per-claim result: every file's outcome plus the derived claim status.
#[derive(Debug)]
pub struct ClaimOutcome {
    pub claim_id: String,
    pub claim_no: String,
    pub outcomes: Vec<DownloadOutcome>,
    pub status: ClaimStatus,
}

impl ClaimOutcome {
    /// True when the claim had files and none of them succeeded.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| !o.status.is_success())
    }

    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(|o| o.status.is_success())
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status.is_success())
            .count()
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.outcomes.iter().filter_map(|o| o.size_bytes).sum()
    }
}

/// Downloads every file of a claim in stored order, isolating failures so
/// one bad file never aborts its siblings.
pub struct ClaimProcessor {
    fetcher: Arc<dyn Fetcher>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    validator: ArtifactValidator,
    storage: FsArtifactStore,
    inter_download_delay: Duration,
}

impl ClaimProcessor {
    pub fn new(
        config: &DownloadConfig,
        fetcher: Arc<dyn Fetcher>,
        limiter: Arc<RateLimiter>,
        storage: FsArtifactStore,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            retry: RetryPolicy::new(config.retry_attempts, config.retry_delay()),
            validator: ArtifactValidator::from_config(config),
            storage,
            inter_download_delay: config.inter_download_delay(),
        }
    }

    /// Process one claim. Never fails: every file produces an outcome, and
    /// the claim status is rolled up from them.
    pub async fn process_claim(&self, claim: &Claim) -> ClaimOutcome {
        info!(
            claim_id = %claim.claim_id,
            claim_no = %claim.claim_no,
            files = claim.files.len(),
            "processing claim"
        );

        let mut outcomes = Vec::with_capacity(claim.files.len());

        for (idx, file) in claim.files.iter().enumerate() {
            if idx > 0 && !self.inter_download_delay.is_zero() {
                tokio::time::sleep(self.inter_download_delay).await;
            }

            let outcome = self.process_file(file).await;
            metrics::FILES_DOWNLOADED
                .with_label_values(&[outcome.status.as_str()])
                .inc();
            metrics::FETCH_ATTEMPTS.inc_by(outcome.attempts as u64);
            if let Some(bytes) = outcome.size_bytes {
                metrics::BYTES_DOWNLOADED.inc_by(bytes);
            }
            outcomes.push(outcome);
        }

        let status = ClaimStatus::from_counts(
            outcomes.iter().filter(|o| o.status.is_success()).count(),
            outcomes.len(),
        );

        info!(
            claim_id = %claim.claim_id,
            status = status.as_str(),
            succeeded = outcomes.iter().filter(|o| o.status.is_success()).count(),
            failed = outcomes.iter().filter(|o| !o.status.is_success()).count(),
            "claim processed"
        );

        ClaimOutcome {
            claim_id: claim.claim_id.clone(),
            claim_no: claim.claim_no.clone(),
            outcomes,
            status,
        }
    }

    /// One file: rate limit -> retry(fetch) -> validate -> persist.
    async fn process_file(&self, file: &FileRef) -> DownloadOutcome {
        self.limiter.acquire().await;

        let fetched = match self.retry.execute(self.fetcher.as_ref(), file).await {
            Ok(fetched) => fetched,
            Err(retry_err) => {
                return DownloadOutcome::failure(
                    file.clone(),
                    retry_err.attempts(),
                    retry_err.status(),
                    retry_err.error().to_string(),
                );
            }
        };

        if let Err(validation_err) = self.validator.validate(&fetched.bytes) {
            warn!(
                file_id = %file.file_id,
                size = fetched.bytes.len(),
                error = %validation_err,
                "payload rejected by validation"
            );
            return DownloadOutcome::failure(
                file.clone(),
                fetched.attempts,
                OutcomeStatus::ValidationFailed,
                validation_err.to_string(),
            );
        }

        match self.storage.store(file, &fetched.bytes).await {
            Ok(artifact) => {
                debug!(
                    file_id = %file.file_id,
                    path = %artifact.path.display(),
                    size = artifact.size_bytes,
                    "artifact stored"
                );
                DownloadOutcome {
                    file: file.clone(),
                    attempts: fetched.attempts,
                    status: OutcomeStatus::Succeeded,
                    size_bytes: Some(artifact.size_bytes),
                    local_path: Some(artifact.path),
                    checksum: Some(artifact.checksum),
                    error: None,
                    finished_at: Utc::now(),
                }
            }
            // A local write failure is not a transport problem; retrying the
            // download would rewrite the same bytes into the same sick disk.
            Err(storage_err) => {
                warn!(
                    file_id = %file.file_id,
                    error = %storage_err,
                    "failed to persist artifact"
                );
                DownloadOutcome::failure(
                    file.clone(),
                    fetched.attempts,
                    OutcomeStatus::FatalFailed,
                    storage_err.to_string(),
                )
            }
        }
    }
}
