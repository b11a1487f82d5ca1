//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - File downloads (results, attempts, bytes)
//! - Batch cycles (terminal states, durations, commits)
//! - Maintenance jobs (cleanup deletions)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

// =============================================================================
// Download Metrics
// =============================================================================

/// File download outcomes by final classification.
pub static FILES_DOWNLOADED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "claimfetch_files_downloaded_total",
            "Total file download outcomes",
        ),
        &["result"], // "succeeded", "validation_failed", "transient_failed", "fatal_failed"
    )
    .unwrap()
});

/// Individual fetch attempts, including retries.
pub static FETCH_ATTEMPTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("claimfetch_fetch_attempts_total", "Total fetch attempts").unwrap()
});

/// Bytes of validated artifacts persisted to storage.
pub static BYTES_DOWNLOADED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "claimfetch_bytes_downloaded_total",
        "Total artifact bytes persisted",
    )
    .unwrap()
});

// =============================================================================
// Cycle Metrics
// =============================================================================

/// Cycles by terminal state.
pub static CYCLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("claimfetch_cycles_total", "Total batch cycles"),
        &["outcome"], // "completed", "no_work", "aborted", "interrupted", "error"
    )
    .unwrap()
});

/// Cycle duration in seconds.
pub static CYCLE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "claimfetch_cycle_duration_seconds",
            "Duration of batch cycles",
        )
        .buckets(vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
    )
    .unwrap()
});

/// Claims processed across all cycles.
pub static CLAIMS_PROCESSED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("claimfetch_claims_processed_total", "Total claims processed").unwrap()
});

/// Outcome batches committed to the store.
pub static BATCH_COMMITS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("claimfetch_batch_commits_total", "Total batch commits"),
        &["result"], // "success", "error"
    )
    .unwrap()
});

/// Cycles aborted by the consecutive-failure threshold.
pub static FAILURE_THRESHOLD_ABORTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "claimfetch_failure_threshold_aborts_total",
        "Cycles aborted after consecutive all-failed claims",
    )
    .unwrap()
});

// =============================================================================
// Maintenance Metrics
// =============================================================================

/// Failure records removed by retention cleanup.
pub static CLEANUP_DELETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "claimfetch_cleanup_deleted_total",
        "Old failure records deleted by cleanup",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(FILES_DOWNLOADED.clone()),
        Box::new(FETCH_ATTEMPTS.clone()),
        Box::new(BYTES_DOWNLOADED.clone()),
        Box::new(CYCLES_TOTAL.clone()),
        Box::new(CYCLE_DURATION.clone()),
        Box::new(CLAIMS_PROCESSED.clone()),
        Box::new(BATCH_COMMITS.clone()),
        Box::new(FAILURE_THRESHOLD_ABORTS.clone()),
        Box::new(CLEANUP_DELETED.clone()),
    ]
}

/// Build a registry with every core metric registered.
pub fn build_registry() -> Registry {
    let registry = Registry::new();
    for metric in all_metrics() {
        // Duplicate registration only happens if the caller builds two
        // registries; ignore rather than panic.
        let _ = registry.register(metric);
    }
    registry
}

/// Encode the registry's current state in Prometheus text format.
pub fn encode_text(registry: &Registry) -> String {
    use prometheus::Encoder;

    let mut buffer = Vec::new();
    let encoder = prometheus::TextEncoder::new();
    if encoder.encode(&registry.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
