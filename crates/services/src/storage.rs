//! Audio blob layout on disk: `<root>/<node_id>/<YYYY-MM-DD>/<filename>`.
//!
//! The per-day folder level is what the retention sweep reaps, so the
//! layout is a contract, not a convenience.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid filename: {0}")]
    InvalidFilename(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct SavedBlob {
    pub path: PathBuf,
    pub size: u64,
}

/// Totals over the blob tree, reported by the health endpoint.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StorageStats {
    pub audio_files: u64,
    pub audio_bytes: u64,
}

#[derive(Clone)]
pub struct AudioStorage {
    root: PathBuf,
}

impl AudioStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn save(
        &self,
        node_id: &str,
        recorded_at: DateTime<Utc>,
        filename: &str,
        bytes: &[u8],
    ) -> Result<SavedBlob, StorageError> {
        let filename = sanitize(filename)?;
        let node_dir = sanitize(node_id)?;
        let dir = self
            .root
            .join(node_dir)
            .join(recorded_at.format("%Y-%m-%d").to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(filename);
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "Stored audio blob");
        Ok(SavedBlob {
            path,
            size: bytes.len() as u64,
        })
    }

    pub async fn remove(&self, path: &Path) -> Result<(), StorageError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Walks `<root>/<node>/<date>/` and sums the stored blobs. A missing
    /// root counts as empty, since nothing has been uploaded yet.
    pub async fn stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats::default();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(entry.path());
                } else {
                    stats.audio_files += 1;
                    stats.audio_bytes += meta.len();
                }
            }
        }
        Ok(stats)
    }
}

/// Rejects path traversal in node-supplied names.
fn sanitize(name: &str) -> Result<&str, StorageError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(StorageError::InvalidFilename(name.to_string()));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn saves_under_node_and_date_folder() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AudioStorage::new(dir.path());
        let recorded = Utc.with_ymd_and_hms(2026, 8, 25, 9, 30, 0).unwrap();

        let blob = storage
            .save("kitchen", recorded, "clip-0930.wav", b"RIFF")
            .await
            .unwrap();
        assert_eq!(blob.size, 4);
        assert!(blob.path.ends_with("kitchen/2026-08-25/clip-0930.wav"));
        assert!(blob.path.exists());
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AudioStorage::new(dir.path());
        let err = storage
            .save("kitchen", Utc::now(), "../../etc/passwd", b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidFilename(_)));
    }

    #[tokio::test]
    async fn stats_sum_every_blob() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AudioStorage::new(dir.path());
        let recorded = Utc.with_ymd_and_hms(2026, 8, 25, 9, 30, 0).unwrap();
        storage.save("kitchen", recorded, "a.wav", b"RIFF").await.unwrap();
        storage.save("kitchen", recorded, "b.wav", b"RIFFRIFF").await.unwrap();
        storage.save("bedroom", recorded, "c.wav", b"RI").await.unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.audio_files, 3);
        assert_eq!(stats.audio_bytes, 14);
    }

    #[tokio::test]
    async fn stats_on_missing_root_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AudioStorage::new(dir.path().join("never-created"));
        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.audio_files, 0);
        assert_eq!(stats.audio_bytes, 0);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AudioStorage::new(dir.path());
        let blob = storage
            .save("kitchen", Utc::now(), "clip.wav", b"RIFF")
            .await
            .unwrap();
        storage.remove(&blob.path).await.unwrap();
        storage.remove(&blob.path).await.unwrap();
        assert!(!blob.path.exists());
    }
}
