//! In-memory stores with the same claim/lease semantics as the MongoDB
//! implementations. Used by the coordinator tests and handy for local
//! development without a running `mongod`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use homemic_db::models::{Clip, ClipStatus, Keyword, WorkerLease};
use parking_lot::Mutex;

use super::{ClipStore, CompletedTranscription, FailOutcome, KeywordStore, RetryPolicy, StoreError};

#[derive(Default)]
pub struct MemoryClipStore {
    clips: Mutex<HashMap<ObjectId, Clip>>,
}

impl MemoryClipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, id: ObjectId) -> Option<Clip> {
        self.clips.lock().get(&id).cloned()
    }

    fn lease_owns(clip: &Clip, lease_id: &str) -> bool {
        clip.status == ClipStatus::Processing
            && clip.lease.as_ref().is_some_and(|l| l.id == lease_id)
    }
}

#[async_trait]
impl ClipStore for MemoryClipStore {
    async fn insert(&self, mut clip: Clip) -> Result<ObjectId, StoreError> {
        let id = clip.id.unwrap_or_else(ObjectId::new);
        clip.id = Some(id);
        self.clips.lock().insert(id, clip);
        Ok(id)
    }

    async fn get(&self, id: ObjectId) -> Result<Clip, StoreError> {
        self.clips.lock().get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn claim_next(
        &self,
        lease_id: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Clip>, StoreError> {
        let mut clips = self.clips.lock();
        let candidate = clips
            .values()
            .filter(|c| {
                c.status == ClipStatus::Pending
                    && c.next_attempt_at.is_none_or(|t| t.to_chrono() <= now)
            })
            .min_by_key(|c| c.recorded_at)
            .and_then(|c| c.id);

        let Some(id) = candidate else {
            return Ok(None);
        };
        let clip = clips.get_mut(&id).ok_or(StoreError::NotFound)?;
        clip.status = ClipStatus::Processing;
        clip.lease = Some(WorkerLease {
            id: lease_id.to_string(),
            expires_at: bson::DateTime::from_chrono(
                now + chrono::Duration::from_std(lease_ttl).unwrap_or_default(),
            ),
        });
        Ok(Some(clip.clone()))
    }

    async fn renew_lease(
        &self,
        clip_id: ObjectId,
        lease_id: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut clips = self.clips.lock();
        let Some(clip) = clips.get_mut(&clip_id) else {
            return Ok(false);
        };
        if !Self::lease_owns(clip, lease_id) {
            return Ok(false);
        }
        clip.lease = Some(WorkerLease {
            id: lease_id.to_string(),
            expires_at: bson::DateTime::from_chrono(
                now + chrono::Duration::from_std(lease_ttl).unwrap_or_default(),
            ),
        });
        Ok(true)
    }

    async fn complete(
        &self,
        clip_id: ObjectId,
        lease_id: &str,
        result: CompletedTranscription,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut clips = self.clips.lock();
        let clip = clips.get_mut(&clip_id).ok_or(StoreError::NotFound)?;
        if !Self::lease_owns(clip, lease_id) {
            return Err(StoreError::LeaseExpired);
        }
        clip.status = ClipStatus::Transcribed;
        clip.segments = result.segments;
        clip.transcript_text = Some(result.transcript_text);
        clip.word_count = result.word_count;
        clip.processing_duration_ms = Some(result.processing_duration_ms);
        clip.processed_at = Some(bson::DateTime::from_chrono(now));
        clip.lease = None;
        clip.error_message = None;
        clip.next_attempt_at = None;
        Ok(())
    }

    async fn fail_attempt(
        &self,
        clip_id: ObjectId,
        lease_id: &str,
        error: &str,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailOutcome, StoreError> {
        let mut clips = self.clips.lock();
        let clip = clips.get_mut(&clip_id).ok_or(StoreError::NotFound)?;
        if !Self::lease_owns(clip, lease_id) {
            return Err(StoreError::LeaseExpired);
        }
        clip.attempts += 1;
        clip.error_message = Some(error.to_string());
        clip.lease = None;
        if clip.attempts as u32 >= policy.max_attempts {
            clip.status = ClipStatus::Failed;
            clip.next_attempt_at = None;
            Ok(FailOutcome::Exhausted)
        } else {
            let delay = policy.backoff_after(clip.attempts as u32);
            let next = now + chrono::Duration::from_std(delay).unwrap_or_default();
            clip.status = ClipStatus::Pending;
            clip.next_attempt_at = Some(bson::DateTime::from_chrono(next));
            Ok(FailOutcome::Requeued {
                attempt: clip.attempts as u32,
                next_attempt_at: next,
            })
        }
    }

    async fn release_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut clips = self.clips.lock();
        let mut released = 0;
        for clip in clips.values_mut() {
            let expired = clip.status == ClipStatus::Processing
                && clip.lease.as_ref().is_some_and(|l| l.expires_at.to_chrono() <= now);
            if expired {
                clip.status = ClipStatus::Pending;
                clip.lease = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn retry(&self, clip_id: ObjectId, _now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut clips = self.clips.lock();
        let clip = clips.get_mut(&clip_id).ok_or(StoreError::NotFound)?;
        if clip.status != ClipStatus::Failed {
            return Ok(false);
        }
        // Suppressed clips are terminal; re-queuing one would transcribe
        // audio the privacy gate refused.
        let suppressed = clip
            .error_message
            .as_deref()
            .is_some_and(|m| m.starts_with(crate::privacy::SUPPRESSED_PREFIX));
        if suppressed {
            return Ok(false);
        }
        clip.status = ClipStatus::Pending;
        clip.attempts = 0;
        clip.next_attempt_at = None;
        clip.error_message = None;
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemoryKeywordStore {
    keywords: Mutex<Vec<Keyword>>,
}

impl MemoryKeywordStore {
    pub fn new(keywords: Vec<Keyword>) -> Self {
        Self {
            keywords: Mutex::new(keywords),
        }
    }

    pub fn detection_count(&self, keyword_id: ObjectId) -> i64 {
        self.keywords
            .lock()
            .iter()
            .find(|k| k.id == Some(keyword_id))
            .map(|k| k.detection_count)
            .unwrap_or(0)
    }
}

#[async_trait]
impl KeywordStore for MemoryKeywordStore {
    async fn list_enabled(&self) -> Result<Vec<Keyword>, StoreError> {
        Ok(self.keywords.lock().iter().filter(|k| k.enabled).cloned().collect())
    }

    async fn record_detection(
        &self,
        keyword_id: ObjectId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut keywords = self.keywords.lock();
        let kw = keywords
            .iter_mut()
            .find(|k| k.id == Some(keyword_id))
            .ok_or(StoreError::NotFound)?;
        kw.detection_count += 1;
        kw.last_detected = Some(bson::DateTime::from_chrono(at));
        Ok(())
    }
}
