//! Batch cycle controller.
//!
//! One cycle runs discover -> process -> commit:
//! - **Discovering**: ask the store for pending claims; empty is a no-op.
//! - **Processing**: claims in discovery order, one at a time, accumulating
//!   outcomes into an in-memory batch.
//! - **Committing**: whenever the batch reaches the configured size, and once
//!   more at the end. Multiple commit sub-cycles per cycle are expected.
//!
//! The consecutive-failure counter spans cycles for the life of the process.
//! Reaching the threshold aborts the current cycle; the next scheduled cycle
//! still runs and may recover.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::claim::{ClaimStore, DiscoveryOptions, DownloadOutcome};
use crate::config::CycleConfig;
use crate::metrics;
use crate::processor::ClaimProcessor;

use super::types::{CycleError, CycleReport, CycleStats, CycleTermination};

pub struct CycleController {
    store: Arc<dyn ClaimStore>,
    processor: ClaimProcessor,
    config: CycleConfig,
    inter_claim_delay: Duration,
    /// All-failed claims in a row, across cycles. Reset by any claim with at
    /// least one success.
    consecutive_failures: AtomicU32,
}

impl CycleController {
    pub fn new(
        store: Arc<dyn ClaimStore>,
        processor: ClaimProcessor,
        config: CycleConfig,
        inter_claim_delay: Duration,
    ) -> Self {
        Self {
            store,
            processor,
            config,
            inter_claim_delay,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Run one full cycle. `running` is checked between claims; clearing it
    /// lets the in-flight claim finish and leaves the rest for next time.
    pub async fn run_cycle(&self, running: &AtomicBool) -> Result<CycleReport, CycleError> {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut stats = CycleStats::default();

        debug!(state = "discovering", "cycle started");
        let claims = self.store.list_pending_claims(&DiscoveryOptions {
            retry_failed: self.config.retry_failed_downloads,
            limit: self.config.max_claims_per_cycle,
        })?;

        if claims.is_empty() {
            info!("no pending claims, ending cycle");
            stats.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(self.finish(CycleTermination::NoWork, stats, started_at));
        }

        stats.claims_discovered = claims.len();
        info!(claims = claims.len(), "discovered pending claims");

        debug!(state = "processing", "processing claims");
        let mut batch: Vec<DownloadOutcome> = Vec::new();
        let mut termination = CycleTermination::Completed;

        for (idx, claim) in claims.iter().enumerate() {
            if !running.load(Ordering::Relaxed) {
                info!(
                    remaining = claims.len() - idx,
                    "shutdown requested, stopping cycle between claims"
                );
                termination = CycleTermination::Interrupted;
                break;
            }

            if idx > 0 && !self.inter_claim_delay.is_zero() {
                tokio::time::sleep(self.inter_claim_delay).await;
            }

            let outcome = self.processor.process_claim(claim).await;
            let all_failed = outcome.all_failed();
            let any_succeeded = outcome.any_succeeded();
            stats.claims_processed += 1;
            stats.files_succeeded += outcome.succeeded_count();
            stats.files_failed += outcome.outcomes.len() - outcome.succeeded_count();
            stats.bytes_downloaded += outcome.bytes_downloaded();
            metrics::CLAIMS_PROCESSED.inc();
            batch.extend(outcome.outcomes);

            if batch.len() >= self.config.batch_size {
                debug!(state = "committing", outcomes = batch.len(), "batch full");
                self.commit(&mut batch, &mut stats)?;
            }

            if all_failed {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    claim_id = %claim.claim_id,
                    consecutive_failures = failures,
                    threshold = self.config.failure_alert_threshold,
                    "claim failed entirely"
                );

                if failures >= self.config.failure_alert_threshold {
                    error!(
                        consecutive_failures = failures,
                        unattempted = claims.len() - idx - 1,
                        "consecutive-failure threshold reached, aborting cycle"
                    );
                    metrics::FAILURE_THRESHOLD_ABORTS.inc();
                    termination = CycleTermination::Aborted {
                        consecutive_failures: failures,
                    };
                    break;
                }

                if !self.config.continue_on_error {
                    warn!(
                        claim_id = %claim.claim_id,
                        "continue_on_error disabled, ending cycle after failed claim"
                    );
                    termination = CycleTermination::Aborted {
                        consecutive_failures: failures,
                    };
                    break;
                }
            } else if any_succeeded {
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
        }

        // Outcomes of attempted claims are real regardless of how the cycle
        // ended; persist them before handing control back.
        if !batch.is_empty() {
            debug!(state = "committing", outcomes = batch.len(), "final batch");
            self.commit(&mut batch, &mut stats)?;
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        Ok(self.finish(termination, stats, started_at))
    }

    fn commit(
        &self,
        batch: &mut Vec<DownloadOutcome>,
        stats: &mut CycleStats,
    ) -> Result<(), CycleError> {
        match self.store.commit_outcomes(batch) {
            Ok(()) => {
                metrics::BATCH_COMMITS.with_label_values(&["success"]).inc();
                stats.batches_committed += 1;
                debug!(outcomes = batch.len(), "batch committed");
                batch.clear();
                Ok(())
            }
            Err(e) => {
                metrics::BATCH_COMMITS.with_label_values(&["error"]).inc();
                error!(
                    outcomes = batch.len(),
                    error = %e,
                    "batch commit failed, aborting cycle"
                );
                Err(CycleError::Store(e))
            }
        }
    }

    fn finish(
        &self,
        termination: CycleTermination,
        stats: CycleStats,
        started_at: chrono::DateTime<Utc>,
    ) -> CycleReport {
        metrics::CYCLES_TOTAL
            .with_label_values(&[termination.as_str()])
            .inc();
        metrics::CYCLE_DURATION.observe(stats.duration_ms as f64 / 1000.0);

        info!(
            termination = termination.as_str(),
            claims_processed = stats.claims_processed,
            files_succeeded = stats.files_succeeded,
            files_failed = stats.files_failed,
            bytes = stats.bytes_downloaded,
            duration_ms = stats.duration_ms,
            "cycle finished"
        );

        CycleReport {
            termination,
            stats,
            started_at,
        }
    }
}
