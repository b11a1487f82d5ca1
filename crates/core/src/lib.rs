//! Core library for the claim artifact download service.
//!
//! The service periodically discovers pending claims in the tracking store,
//! downloads their PDF artifacts from the file-serving API, validates and
//! persists each artifact, and records per-file outcomes so completed work
//! is never repeated.

pub mod claim;
pub mod config;
pub mod download;
pub mod maintenance;
pub mod metrics;
pub mod orchestrator;
pub mod processor;
pub mod storage;
pub mod testing;

pub use claim::{
    Claim, ClaimStatus, ClaimStore, DiscoveryOptions, DownloadOutcome, FileRef, OutcomeStatus,
    RecentOutcome, SqliteClaimStore, StoreError, StoreStatistics,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DownloadConfig,
    Environment, ProfileConfig, SanitizedConfig,
};
pub use download::{
    ArtifactValidator, FetchError, Fetcher, HttpFetcher, RateLimiter, RetryPolicy, ValidationError,
};
pub use orchestrator::{
    CycleController, CycleError, CycleReport, CycleStats, CycleTermination, Scheduler,
};
pub use processor::{ClaimOutcome, ClaimProcessor};
pub use storage::{FsArtifactStore, StorageError, StoredArtifact};
