//! Retention sweep for audio blobs.
//!
//! Audio lives under `<root>/<node_id>/<YYYY-MM-DD>/`, so retention is a
//! directory walk: any date folder older than the cutoff is removed whole.
//! Clip rows and transcripts are kept forever; only the audio goes.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info, warn};

use crate::store::mongo::MongoClipStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub removed_dirs: u64,
    pub removed_files: u64,
}

#[derive(Clone)]
pub struct RetentionSweep {
    root: PathBuf,
    retention_days: u32,
}

impl RetentionSweep {
    pub fn new(root: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            root: root.into(),
            retention_days,
        }
    }

    pub fn cutoff(&self) -> NaiveDate {
        Utc::now().date_naive() - chrono::Duration::days(self.retention_days as i64)
    }

    /// One pass over the whole tree. Returns what was reaped.
    pub async fn run_once(&self) -> std::io::Result<SweepStats> {
        let cutoff = self.cutoff();
        let mut stats = SweepStats::default();

        let mut nodes = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e),
        };
        while let Some(node_entry) = nodes.next_entry().await? {
            if !node_entry.file_type().await?.is_dir() {
                continue;
            }
            let mut days = tokio::fs::read_dir(node_entry.path()).await?;
            while let Some(day_entry) = days.next_entry().await? {
                if !day_entry.file_type().await?.is_dir() {
                    continue;
                }
                let name = day_entry.file_name();
                let Some(date) = name
                    .to_str()
                    .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                else {
                    warn!(dir = %day_entry.path().display(), "Unrecognised folder in audio tree, skipping");
                    continue;
                };
                if date >= cutoff {
                    continue;
                }
                let files = count_files(day_entry.path()).await?;
                tokio::fs::remove_dir_all(day_entry.path()).await?;
                stats.removed_dirs += 1;
                stats.removed_files += files;
            }
        }

        if stats.removed_dirs > 0 {
            info!(
                dirs = stats.removed_dirs,
                files = stats.removed_files,
                cutoff = %cutoff,
                "Retention sweep reaped expired audio"
            );
        }
        Ok(stats)
    }
}

async fn count_files(dir: PathBuf) -> std::io::Result<u64> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            count += 1;
        }
    }
    Ok(count)
}

/// Registers the nightly sweep (03:00 server time) on the shared scheduler.
/// After reaping the audio it also drops the now-dangling `file_path`
/// references from clip rows.
pub async fn schedule(
    scheduler: &JobScheduler,
    sweep: RetentionSweep,
    clips: Arc<MongoClipStore>,
) -> Result<(), JobSchedulerError> {
    let sweep = Arc::new(sweep);
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _lock| {
            let sweep = Arc::clone(&sweep);
            let clips = Arc::clone(&clips);
            Box::pin(async move {
                if let Err(e) = sweep.run_once().await {
                    error!(error = %e, "Retention sweep failed");
                    return;
                }
                let cutoff = sweep.cutoff().and_hms_opt(0, 0, 0).map(|t| t.and_utc());
                if let Some(cutoff) = cutoff
                    && let Err(e) = clips.clear_file_paths_before(cutoff).await
                {
                    error!(error = %e, "Failed to clear reaped blob paths");
                }
            })
        })?)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn touch(path: PathBuf) {
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, b"RIFF").await.unwrap();
    }

    #[tokio::test]
    async fn reaps_only_expired_date_folders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let today = Utc::now().date_naive();
        let old = (today - chrono::Duration::days(30)).format("%Y-%m-%d").to_string();
        let fresh = today.format("%Y-%m-%d").to_string();

        touch(root.join("kitchen").join(&old).join("a.wav")).await;
        touch(root.join("kitchen").join(&old).join("b.wav")).await;
        touch(root.join("kitchen").join(&fresh).join("c.wav")).await;
        touch(root.join("bedroom").join(&old).join("d.wav")).await;

        let sweep = RetentionSweep::new(root, 14);
        let stats = sweep.run_once().await.unwrap();
        assert_eq!(stats.removed_dirs, 2);
        assert_eq!(stats.removed_files, 3);

        assert!(!root.join("kitchen").join(&old).exists());
        assert!(root.join("kitchen").join(&fresh).join("c.wav").exists());
        assert!(!root.join("bedroom").join(&old).exists());
    }

    #[tokio::test]
    async fn skips_unparseable_folders_and_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root.join("kitchen").join("not-a-date").join("x.wav")).await;

        let sweep = RetentionSweep::new(root, 14);
        let stats = sweep.run_once().await.unwrap();
        assert_eq!(stats, SweepStats::default());
        assert!(root.join("kitchen").join("not-a-date").join("x.wav").exists());

        let gone = RetentionSweep::new(root.join("nonexistent"), 14);
        assert_eq!(gone.run_once().await.unwrap(), SweepStats::default());
    }
}
