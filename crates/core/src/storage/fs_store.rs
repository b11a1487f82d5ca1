//! File system artifact store.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::warn;

use crate::claim::FileRef;

/// Error writing an artifact to local storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A successfully persisted artifact.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// SHA-256 of the stored bytes, recorded for later integrity checks.
    pub checksum: String,
}

/// Writes validated artifacts under `<root>/<YYYYMMDD>/CLAIM_<claim>_<file>.pdf`.
///
/// Bytes land in a `.part` file first and are renamed into place after a
/// flush, so a crash or write error never leaves a partial artifact at the
/// final path.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage root if it does not exist. Called once at startup.
    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::DirectoryCreationFailed {
                path: self.root.clone(),
                source: e,
            })
    }

    /// The final path an artifact for this file reference lands at.
    pub fn artifact_path(&self, file: &FileRef) -> PathBuf {
        self.root.join(file.date_dir()).join(file.local_name())
    }

    pub async fn store(
        &self,
        file: &FileRef,
        bytes: &[u8],
    ) -> Result<StoredArtifact, StorageError> {
        let dir = self.root.join(file.date_dir());
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::DirectoryCreationFailed {
                path: dir.clone(),
                source: e,
            })?;

        let final_path = dir.join(file.local_name());
        let part_path = dir.join(format!("{}.part", file.local_name()));

        if let Err(e) = self.write_part(&part_path, bytes).await {
            // Never leave a partial file behind.
            if let Err(cleanup_err) = fs::remove_file(&part_path).await {
                if cleanup_err.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        path = %part_path.display(),
                        error = %cleanup_err,
                        "failed to remove partial file"
                    );
                }
            }
            return Err(StorageError::WriteFailed {
                path: part_path,
                source: e,
            });
        }

        fs::rename(&part_path, &final_path)
            .await
            .map_err(|e| StorageError::WriteFailed {
                path: final_path.clone(),
                source: e,
            })?;

        Ok(StoredArtifact {
            path: final_path,
            size_bytes: bytes.len() as u64,
            checksum: format!("{:x}", Sha256::digest(bytes)),
        })
    }

    async fn write_part(&self, path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
        let file = File::create(path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pdf_bytes, test_file_ref};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_writes_to_date_directory() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(temp.path());
        let file = test_file_ref("F1", "C1");

        let artifact = store.store(&file, &pdf_bytes(2048)).await.unwrap();

        assert_eq!(artifact.size_bytes, 2048);
        assert_eq!(artifact.path, store.artifact_path(&file));
        assert!(artifact.path.exists());
        assert_eq!(
            artifact.path.parent().unwrap().file_name().unwrap(),
            file.date_dir().as_str()
        );
    }

    #[tokio::test]
    async fn test_no_part_file_remains_after_store() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(temp.path());
        let file = test_file_ref("F1", "C1");

        store.store(&file, &pdf_bytes(2048)).await.unwrap();

        let dir = temp.path().join(file.date_dir());
        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec![file.local_name()]);
    }

    #[tokio::test]
    async fn test_store_overwrites_previous_artifact() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(temp.path());
        let file = test_file_ref("F1", "C1");

        store.store(&file, &pdf_bytes(1024)).await.unwrap();
        let artifact = store.store(&file, &pdf_bytes(4096)).await.unwrap();

        let on_disk = tokio::fs::metadata(&artifact.path).await.unwrap();
        assert_eq!(on_disk.len(), 4096);
    }

    #[tokio::test]
    async fn test_checksum_is_stable() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(temp.path());
        let file = test_file_ref("F1", "C1");

        let a = store.store(&file, &pdf_bytes(2048)).await.unwrap();
        let b = store.store(&file, &pdf_bytes(2048)).await.unwrap();
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.checksum.len(), 64);
    }

    #[tokio::test]
    async fn test_ensure_root_creates_directories() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nested/claims");
        let store = FsArtifactStore::new(&root);

        store.ensure_root().await.unwrap();
        assert!(root.is_dir());
    }
}
