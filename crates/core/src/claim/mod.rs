//! Claim tracking: domain types and the storage backend.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteClaimStore;
pub use store::{ClaimStore, DiscoveryOptions, StoreError};
pub use types::{
    Claim, ClaimStatus, DownloadOutcome, FileRef, OutcomeStatus, RecentOutcome, StoreStatistics,
};
