pub mod memory;
pub mod mongo;

use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use homemic_db::models::{Clip, Keyword, TranscriptSegment};
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("clip not found")]
    NotFound,
    /// The caller's lease no longer owns the clip: it expired and was
    /// reclaimed, or another worker has since claimed it.
    #[error("worker lease is no longer valid")]
    LeaseExpired,
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<bson::ser::Error> for StoreError {
    fn from(e: bson::ser::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Everything a successful transcription writes back in one shot.
///
/// Applied as a single guarded update so the segment batch and the flip
/// to `transcribed` land together or not at all.
#[derive(Debug, Clone)]
pub struct CompletedTranscription {
    pub segments: Vec<TranscriptSegment>,
    pub transcript_text: String,
    pub word_count: i32,
    pub processing_duration_ms: i64,
}

/// What happened to a clip after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// Back to `pending`, claimable from `next_attempt_at` on.
    Requeued {
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// Attempt budget exhausted; the clip is terminally `failed`.
    Exhausted,
}

/// Exponential backoff with jitter for transcription retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, given `attempt` completed
    /// attempts: `base * 2^(attempt-1)`, jittered by ±20%.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(10);
        let base = self.base_backoff.as_millis() as u64 * (1u64 << exp);
        let jitter = rand::rng().random_range(0.8..1.2);
        Duration::from_millis((base as f64 * jitter) as u64)
    }
}

/// Persistence seam for the clip pipeline.
///
/// The store *is* the work queue: `claim_next` scans `pending` clips whose
/// `next_attempt_at` has passed, so no separate queue structure exists and
/// a restart loses nothing.
#[async_trait]
pub trait ClipStore: Send + Sync + 'static {
    async fn insert(&self, clip: Clip) -> Result<ObjectId, StoreError>;

    async fn get(&self, id: ObjectId) -> Result<Clip, StoreError>;

    /// Atomically claims the oldest eligible `pending` clip: flips it to
    /// `processing` and stamps a fresh lease in one compare-and-set, so at
    /// most one worker ever holds a given clip.
    async fn claim_next(
        &self,
        lease_id: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Clip>, StoreError>;

    /// Extends the lease deadline. Returns `false` when the lease no longer
    /// owns the clip, in which case the worker must abandon it.
    async fn renew_lease(
        &self,
        clip_id: ObjectId,
        lease_id: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Persists the transcription result and flips the clip to
    /// `transcribed`, guarded by the lease. A stale lease gets
    /// `LeaseExpired` and writes nothing.
    async fn complete(
        &self,
        clip_id: ObjectId,
        lease_id: &str,
        result: CompletedTranscription,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Records a failed attempt, guarded by the lease. Requeues with
    /// backoff until `policy.max_attempts` is reached, then goes terminal.
    async fn fail_attempt(
        &self,
        clip_id: ObjectId,
        lease_id: &str,
        error: &str,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailOutcome, StoreError>;

    /// Reverts clips whose lease deadline has passed back to `pending`.
    /// Returns how many were reclaimed.
    async fn release_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Manual `failed → pending` retry; resets the attempt counter.
    /// Returns `false` if the clip is not currently `failed`.
    async fn retry(&self, clip_id: ObjectId, now: DateTime<Utc>) -> Result<bool, StoreError>;
}

/// Keyword lookup and detection bookkeeping used by the pipeline.
#[async_trait]
pub trait KeywordStore: Send + Sync + 'static {
    async fn list_enabled(&self) -> Result<Vec<Keyword>, StoreError>;

    async fn record_detection(
        &self,
        keyword_id: ObjectId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_secs(30),
        };
        let first = policy.backoff_after(1);
        let second = policy.backoff_after(2);
        // ±20% jitter bands must not overlap between consecutive attempts.
        assert!(first >= Duration::from_secs(24) && first <= Duration::from_secs(36));
        assert!(second >= Duration::from_secs(48) && second <= Duration::from_secs(72));
    }
}
