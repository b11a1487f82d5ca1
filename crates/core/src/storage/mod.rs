//! Local artifact storage.

mod fs_store;

pub use fs_store::{FsArtifactStore, StorageError, StoredArtifact};
