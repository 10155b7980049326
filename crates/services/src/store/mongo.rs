use std::time::Duration;

use async_trait::async_trait;
use bson::{Document, doc, oid::ObjectId};
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::{Collection, Database, options::ReturnDocument};
use tracing::debug;

use homemic_db::models::{Clip, ClipStatus};

use super::{ClipStore, CompletedTranscription, FailOutcome, RetryPolicy, StoreError};
use crate::dao::base::{DaoError, DaoResult, PaginatedResult, PaginationParams};
use crate::privacy::SUPPRESSED_PREFIX;

/// Filters accepted by the clip history listing.
#[derive(Debug, Clone, Default)]
pub struct ClipQuery {
    pub node_id: Option<String>,
    pub status: Option<ClipStatus>,
    pub recorded_after: Option<DateTime<Utc>>,
    pub recorded_before: Option<DateTime<Utc>>,
    /// Substring match against transcript text and filename.
    pub search: Option<String>,
}

impl ClipQuery {
    fn to_filter(&self) -> Document {
        let mut filter = doc! {};
        if let Some(node_id) = &self.node_id {
            filter.insert("node_id", node_id);
        }
        if let Some(status) = self.status {
            filter.insert("status", status.as_str());
        }
        let mut recorded = doc! {};
        if let Some(after) = self.recorded_after {
            recorded.insert("$gte", bson::DateTime::from_chrono(after));
        }
        if let Some(before) = self.recorded_before {
            recorded.insert("$lte", bson::DateTime::from_chrono(before));
        }
        if !recorded.is_empty() {
            filter.insert("recorded_at", recorded);
        }
        if let Some(search) = &self.search {
            let pattern = regex_escape(search);
            filter.insert(
                "$or",
                vec![
                    doc! { "transcript_text": { "$regex": &pattern, "$options": "i" } },
                    doc! { "filename": { "$regex": &pattern, "$options": "i" } },
                ],
            );
        }
        filter
    }
}

fn regex_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// MongoDB-backed clip store. The `(status, next_attempt_at, recorded_at)`
/// index makes `claim_next` an indexed compare-and-set rather than a scan.
pub struct MongoClipStore {
    collection: Collection<Clip>,
}

impl MongoClipStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(Clip::COLLECTION),
        }
    }

    pub async fn find_by_id(&self, id: ObjectId) -> DaoResult<Clip> {
        self.collection
            .find_one(doc! { "_id": id })
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn history(
        &self,
        query: &ClipQuery,
        params: &PaginationParams,
    ) -> DaoResult<PaginatedResult<Clip>> {
        let filter = query.to_filter();
        let total = self.collection.count_documents(filter.clone()).await?;
        let items = self
            .collection
            .find(filter)
            .sort(doc! { "recorded_at": -1 })
            .skip(params.offset)
            .limit(params.limit.max(1))
            .await?
            .try_collect()
            .await?;
        Ok(PaginatedResult { items, total })
    }

    pub async fn recent_transcribed(&self, limit: i64) -> DaoResult<Vec<Clip>> {
        Ok(self
            .collection
            .find(doc! { "status": ClipStatus::Transcribed.as_str() })
            .sort(doc! { "recorded_at": -1 })
            .limit(limit.max(1))
            .await?
            .try_collect()
            .await?)
    }

    pub async fn find_by_ids(&self, ids: &[ObjectId]) -> DaoResult<Vec<Clip>> {
        Ok(self
            .collection
            .find(doc! { "_id": { "$in": ids } })
            .sort(doc! { "recorded_at": 1 })
            .await?
            .try_collect()
            .await?)
    }

    pub async fn count(&self, filter: Document) -> DaoResult<u64> {
        Ok(self.collection.count_documents(filter).await?)
    }

    /// PATCH semantics: only the provided fields change; an empty string
    /// clears the field.
    pub async fn update_metadata(
        &self,
        id: ObjectId,
        display_name: Option<String>,
        notes: Option<String>,
    ) -> DaoResult<Clip> {
        let mut set = doc! {};
        for (key, value) in [("display_name", display_name), ("notes", notes)] {
            match value {
                Some(v) if v.trim().is_empty() => {
                    set.insert(key, bson::Bson::Null);
                }
                Some(v) => {
                    set.insert(key, v);
                }
                None => {}
            }
        }
        if set.is_empty() {
            return self.find_by_id(id).await;
        }
        self.collection
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(DaoError::NotFound)
    }

    /// Deletes clip rows and returns the blob paths so the caller can
    /// remove the audio from disk afterwards.
    pub async fn delete_many(&self, ids: &[ObjectId]) -> DaoResult<(u64, Vec<String>)> {
        let clips = self.find_by_ids(ids).await?;
        let paths = clips.iter().filter_map(|c| c.file_path.clone()).collect();
        let result = self
            .collection
            .delete_many(doc! { "_id": { "$in": ids } })
            .await?;
        Ok((result.deleted_count, paths))
    }

    /// Reassigns one segment to a speaker (or clears it with `None`).
    pub async fn reassign_speaker(
        &self,
        segment_id: &str,
        speaker_id: Option<ObjectId>,
    ) -> DaoResult<Clip> {
        let value = match speaker_id {
            Some(id) => bson::Bson::ObjectId(id),
            None => bson::Bson::Null,
        };
        self.collection
            .find_one_and_update(
                doc! { "segments.id": segment_id },
                doc! { "$set": { "segments.$.speaker_id": value } },
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(DaoError::NotFound)
    }

    /// Nulls every segment reference to a deleted speaker.
    pub async fn clear_speaker_refs(&self, speaker_id: ObjectId) -> DaoResult<u64> {
        let result = self
            .collection
            .update_many(
                doc! { "segments.speaker_id": speaker_id },
                doc! { "$set": { "segments.$[seg].speaker_id": bson::Bson::Null } },
            )
            .array_filters(vec![doc! { "seg.speaker_id": speaker_id }])
            .await?;
        Ok(result.modified_count)
    }

    /// Drops dangling blob paths after the retention sweep reaped the audio.
    pub async fn clear_file_paths_before(&self, cutoff: DateTime<Utc>) -> DaoResult<u64> {
        let result = self
            .collection
            .update_many(
                doc! {
                    "recorded_at": { "$lt": bson::DateTime::from_chrono(cutoff) },
                    "file_path": { "$ne": bson::Bson::Null },
                },
                doc! { "$set": { "file_path": bson::Bson::Null } },
            )
            .await?;
        Ok(result.modified_count)
    }

    fn lease_filter(clip_id: ObjectId, lease_id: &str) -> Document {
        doc! {
            "_id": clip_id,
            "status": ClipStatus::Processing.as_str(),
            "lease.id": lease_id,
        }
    }

    /// Distinguishes "clip gone" from "lease lost" after a guarded update
    /// matched nothing.
    async fn lease_failure(&self, clip_id: ObjectId) -> StoreError {
        match self.collection.find_one(doc! { "_id": clip_id }).await {
            Ok(Some(_)) => StoreError::LeaseExpired,
            Ok(None) => StoreError::NotFound,
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl ClipStore for MongoClipStore {
    async fn insert(&self, clip: Clip) -> Result<ObjectId, StoreError> {
        let result = self.collection.insert_one(&clip).await?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| StoreError::Backend("inserted _id is not an ObjectId".to_string()))
    }

    async fn get(&self, id: ObjectId) -> Result<Clip, StoreError> {
        self.collection
            .find_one(doc! { "_id": id })
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn claim_next(
        &self,
        lease_id: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Clip>, StoreError> {
        let now_bson = bson::DateTime::from_chrono(now);
        let expires = bson::DateTime::from_chrono(
            now + chrono::Duration::from_std(lease_ttl).unwrap_or_default(),
        );
        let claimed = self
            .collection
            .find_one_and_update(
                doc! {
                    "status": ClipStatus::Pending.as_str(),
                    "$or": [
                        { "next_attempt_at": bson::Bson::Null },
                        { "next_attempt_at": { "$lte": now_bson } },
                    ],
                },
                doc! {
                    "$set": {
                        "status": ClipStatus::Processing.as_str(),
                        "lease": { "id": lease_id, "expires_at": expires },
                    }
                },
            )
            .sort(doc! { "recorded_at": 1 })
            .return_document(ReturnDocument::After)
            .await?;
        Ok(claimed)
    }

    async fn renew_lease(
        &self,
        clip_id: ObjectId,
        lease_id: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let expires = bson::DateTime::from_chrono(
            now + chrono::Duration::from_std(lease_ttl).unwrap_or_default(),
        );
        let result = self
            .collection
            .update_one(
                Self::lease_filter(clip_id, lease_id),
                doc! { "$set": { "lease.expires_at": expires } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn complete(
        &self,
        clip_id: ObjectId,
        lease_id: &str,
        result: CompletedTranscription,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let segments = bson::to_bson(&result.segments)?;
        let update = self
            .collection
            .update_one(
                Self::lease_filter(clip_id, lease_id),
                doc! {
                    "$set": {
                        "status": ClipStatus::Transcribed.as_str(),
                        "segments": segments,
                        "transcript_text": result.transcript_text,
                        "word_count": result.word_count,
                        "processing_duration_ms": result.processing_duration_ms,
                        "processed_at": bson::DateTime::from_chrono(now),
                        "error_message": bson::Bson::Null,
                        "next_attempt_at": bson::Bson::Null,
                        "lease": bson::Bson::Null,
                    }
                },
            )
            .await?;
        if update.matched_count == 0 {
            return Err(self.lease_failure(clip_id).await);
        }
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
        let Some(clip) = self
            .collection
            .find_one(Self::lease_filter(clip_id, lease_id))
            .await?
        else {
            return Err(self.lease_failure(clip_id).await);
        };

        let attempt = clip.attempts as u32 + 1;
        let (update, outcome) = if attempt >= policy.max_attempts {
            (
                doc! {
                    "$set": {
                        "status": ClipStatus::Failed.as_str(),
                        "attempts": attempt as i32,
                        "error_message": error,
                        "next_attempt_at": bson::Bson::Null,
                        "lease": bson::Bson::Null,
                    }
                },
                FailOutcome::Exhausted,
            )
        } else {
            let next = now
                + chrono::Duration::from_std(policy.backoff_after(attempt)).unwrap_or_default();
            (
                doc! {
                    "$set": {
                        "status": ClipStatus::Pending.as_str(),
                        "attempts": attempt as i32,
                        "error_message": error,
                        "next_attempt_at": bson::DateTime::from_chrono(next),
                        "lease": bson::Bson::Null,
                    }
                },
                FailOutcome::Requeued {
                    attempt,
                    next_attempt_at: next,
                },
            )
        };

        // Guard on the attempt counter too, so a racing reclaim cannot
        // double-count this failure.
        let mut filter = Self::lease_filter(clip_id, lease_id);
        filter.insert("attempts", clip.attempts);
        let result = self.collection.update_one(filter, update).await?;
        if result.matched_count == 0 {
            return Err(self.lease_failure(clip_id).await);
        }
        Ok(outcome)
    }

    async fn release_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = self
            .collection
            .update_many(
                doc! {
                    "status": ClipStatus::Processing.as_str(),
                    "lease.expires_at": { "$lte": bson::DateTime::from_chrono(now) },
                },
                doc! {
                    "$set": {
                        "status": ClipStatus::Pending.as_str(),
                        "lease": bson::Bson::Null,
                    }
                },
            )
            .await?;
        if result.modified_count > 0 {
            debug!(count = result.modified_count, "Reclaimed expired worker leases");
        }
        Ok(result.modified_count)
    }

    async fn retry(&self, clip_id: ObjectId, _now: DateTime<Utc>) -> Result<bool, StoreError> {
        // Suppressed clips are terminal; re-queuing one would transcribe
        // audio the privacy gate refused.
        let result = self
            .collection
            .update_one(
                doc! {
                    "_id": clip_id,
                    "status": ClipStatus::Failed.as_str(),
                    "error_message": {
                        "$not": { "$regex": format!("^{SUPPRESSED_PREFIX}") }
                    },
                },
                doc! {
                    "$set": {
                        "status": ClipStatus::Pending.as_str(),
                        "attempts": 0,
                        "next_attempt_at": bson::Bson::Null,
                        "error_message": bson::Bson::Null,
                    }
                },
            )
            .await?;
        Ok(result.matched_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_filter_combines_conditions() {
        let query = ClipQuery {
            node_id: Some("kitchen".to_string()),
            status: Some(ClipStatus::Transcribed),
            search: Some("a.b".to_string()),
            ..Default::default()
        };
        let filter = query.to_filter();
        assert_eq!(filter.get_str("node_id").unwrap(), "kitchen");
        assert_eq!(filter.get_str("status").unwrap(), "transcribed");
        // Regex metacharacters in the search term are escaped.
        let or = filter.get_array("$or").unwrap();
        let first = or[0].as_document().unwrap();
        let regex = first.get_document("transcript_text").unwrap();
        assert_eq!(regex.get_str("$regex").unwrap(), "a\\.b");
    }

    #[test]
    fn empty_query_builds_empty_filter() {
        assert!(ClipQuery::default().to_filter().is_empty());
    }
}
