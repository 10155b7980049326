//! The transcription coordinator: claims pending clips, runs the speech
//! engine, and writes results back under a worker lease.
//!
//! There is no separate queue. The clip store is the queue: workers claim
//! the oldest eligible `pending` clip with an atomic compare-and-set, so a
//! process restart picks up exactly where the database says things stand.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use homemic_config::{PipelineSettings, TranscriberSettings};
use homemic_db::models::{Clip, TranscriptSegment};
use homemic_transcription::{RawSegment, TranscribeRequest, Transcriber};

use crate::events::{Event, EventBus, KeywordDetectedEvent, TranscriptionEvent};
use crate::keywords;
use crate::store::{ClipStore, CompletedTranscription, FailOutcome, KeywordStore, RetryPolicy, StoreError};

const PREVIEW_CHARS: usize = 200;

/// Guard that aborts a spawned task when dropped.
///
/// `tokio::spawn` returns a `JoinHandle` whose `Drop` impl detaches (does NOT abort)
/// the task. This wrapper ensures the task is cancelled if the owning future is cancelled.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    pub lease_ttl: Duration,
    pub lease_renew: Duration,
    pub reclaim_interval: Duration,
    pub retry: RetryPolicy,
    pub language_hint: Option<String>,
}

impl CoordinatorConfig {
    pub fn from_settings(pipeline: &PipelineSettings, transcriber: &TranscriberSettings) -> Self {
        Self {
            workers: pipeline.workers.max(1),
            poll_interval: Duration::from_millis(pipeline.poll_interval_ms),
            lease_ttl: Duration::from_secs(pipeline.lease_ttl_secs),
            lease_renew: Duration::from_secs(pipeline.lease_renew_secs),
            reclaim_interval: Duration::from_secs(pipeline.reclaim_interval_secs),
            retry: RetryPolicy {
                max_attempts: pipeline.max_attempts,
                base_backoff: Duration::from_secs(pipeline.backoff_base_secs),
            },
            language_hint: transcriber.language.clone(),
        }
    }
}

pub struct TranscriptionCoordinator {
    store: Arc<dyn ClipStore>,
    keywords: Arc<dyn KeywordStore>,
    transcriber: Arc<dyn Transcriber>,
    bus: EventBus,
    wake: Arc<Notify>,
    config: CoordinatorConfig,
}

/// Keeps the worker and reclaim tasks alive; dropping it stops them.
pub struct CoordinatorHandle {
    _guards: Vec<AbortOnDrop>,
}

impl TranscriptionCoordinator {
    pub fn new(
        store: Arc<dyn ClipStore>,
        keywords: Arc<dyn KeywordStore>,
        transcriber: Arc<dyn Transcriber>,
        bus: EventBus,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            keywords,
            transcriber,
            bus,
            wake: Arc::new(Notify::new()),
            config,
        })
    }

    /// Handle the ingestion side pokes after inserting a pending clip,
    /// so idle workers react immediately instead of at the next poll.
    pub fn wake_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    pub fn spawn(self: &Arc<Self>) -> CoordinatorHandle {
        info!(
            workers = self.config.workers,
            backend = %self.transcriber.name(),
            "Transcription coordinator starting"
        );
        let mut guards = Vec::with_capacity(self.config.workers + 1);
        for idx in 0..self.config.workers {
            let this = Arc::clone(self);
            guards.push(AbortOnDrop(tokio::spawn(this.worker_loop(idx))));
        }
        let this = Arc::clone(self);
        guards.push(AbortOnDrop(tokio::spawn(this.reclaim_loop())));
        CoordinatorHandle { _guards: guards }
    }

    async fn worker_loop(self: Arc<Self>, worker_idx: usize) {
        debug!(worker = worker_idx, "Transcription worker started");
        loop {
            match self.process_next().await {
                Ok(true) => {} // look for more work immediately
                Ok(false) => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    error!(worker = worker_idx, error = %e, "Claim failed, backing off");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    async fn reclaim_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.reclaim_interval).await;
            match self.store.release_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(count) => {
                    warn!(count, "Reclaimed clips from expired leases");
                    self.wake.notify_waiters();
                }
                Err(e) => error!(error = %e, "Lease reclaim sweep failed"),
            }
        }
    }

    /// Claims and fully processes one clip. Returns false when no clip
    /// was eligible. Exposed for tests; the worker loops drive it.
    pub async fn process_next(&self) -> Result<bool, StoreError> {
        let lease_id = Uuid::new_v4().to_string();
        let Some(clip) = self
            .store
            .claim_next(&lease_id, self.config.lease_ttl, Utc::now())
            .await?
        else {
            return Ok(false);
        };
        self.process_clip(clip, &lease_id).await;
        Ok(true)
    }

    async fn process_clip(&self, clip: Clip, lease_id: &str) {
        let Some(clip_id) = clip.id else {
            error!("Claimed clip without an id, skipping");
            return;
        };
        info!(
            clip = %clip_id,
            node = %clip.node_id,
            attempt = clip.attempts + 1,
            "Transcribing clip"
        );

        // Renew the lease in the background while the engine runs, so a
        // long clip is not reclaimed out from under a live worker.
        let renewal = {
            let store = Arc::clone(&self.store);
            let lease = lease_id.to_string();
            let interval = self.config.lease_renew;
            let ttl = self.config.lease_ttl;
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    match store.renew_lease(clip_id, &lease, ttl, Utc::now()).await {
                        Ok(true) => debug!(clip = %clip_id, "Lease renewed"),
                        Ok(false) => {
                            warn!(clip = %clip_id, "Lease lost during renewal");
                            break;
                        }
                        Err(e) => {
                            warn!(clip = %clip_id, error = %e, "Lease renewal failed");
                            break;
                        }
                    }
                }
            })
        };
        let _renewal_guard = AbortOnDrop(renewal);

        let Some(file_path) = clip.file_path.clone() else {
            self.handle_failure(clip_id, lease_id, "audio blob is gone").await;
            return;
        };

        let started = std::time::Instant::now();
        let request = TranscribeRequest {
            wav_path: file_path.into(),
            language_hint: self.config.language_hint.clone(),
        };
        match self.transcriber.transcribe(request).await {
            Ok(output) => {
                let processing_ms = started.elapsed().as_millis() as i64;
                self.handle_success(&clip, lease_id, output.segments, processing_ms)
                    .await;
            }
            Err(e) => {
                self.handle_failure(clip_id, lease_id, &e.to_string()).await;
            }
        }
    }

    async fn handle_success(
        &self,
        clip: &Clip,
        lease_id: &str,
        raw: Vec<RawSegment>,
        processing_ms: i64,
    ) {
        let clip_id = match clip.id {
            Some(id) => id,
            None => return,
        };
        let segments = sanitize_segments(raw, clip.duration_seconds);
        let transcript_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let word_count = transcript_text.split_whitespace().count() as i32;
        let result = CompletedTranscription {
            segments,
            transcript_text: transcript_text.clone(),
            word_count,
            processing_duration_ms: processing_ms,
        };

        let now = Utc::now();
        match self.store.complete(clip_id, lease_id, result, now).await {
            Ok(()) => {
                info!(
                    clip = %clip_id,
                    words = word_count,
                    elapsed_ms = processing_ms,
                    "Clip transcribed"
                );
                self.bus.publish(Event::Transcription(TranscriptionEvent {
                    clip_id: clip_id.to_hex(),
                    node_id: clip.node_id.clone(),
                    filename: clip.filename.clone(),
                    text_preview: preview(&transcript_text),
                    word_count,
                    duration_seconds: clip.duration_seconds,
                    recorded_at: clip.recorded_at.to_chrono(),
                    processing_duration_ms: processing_ms,
                }));
                self.detect_keywords(clip_id, &transcript_text).await;
            }
            Err(StoreError::LeaseExpired) => {
                // Another worker owns the clip now; our result is discarded
                // and theirs will stand. Nothing to publish.
                warn!(clip = %clip_id, "Lease expired before completion, dropping result");
            }
            Err(e) => error!(clip = %clip_id, error = %e, "Failed to persist transcription"),
        }
    }

    async fn handle_failure(&self, clip_id: bson::oid::ObjectId, lease_id: &str, error: &str) {
        let outcome = self
            .store
            .fail_attempt(clip_id, lease_id, error, &self.config.retry, Utc::now())
            .await;
        match outcome {
            Ok(FailOutcome::Requeued {
                attempt,
                next_attempt_at,
            }) => {
                warn!(
                    clip = %clip_id,
                    attempt,
                    retry_at = %next_attempt_at,
                    error,
                    "Transcription failed, requeued"
                );
            }
            Ok(FailOutcome::Exhausted) => {
                error!(clip = %clip_id, error, "Transcription failed terminally");
            }
            Err(StoreError::LeaseExpired) => {
                warn!(clip = %clip_id, "Lease expired before failure could be recorded");
            }
            Err(e) => error!(clip = %clip_id, error = %e, "Failed to record attempt"),
        }
    }

    /// Matches enabled keywords against the finished transcript and
    /// publishes detections after the transcription event.
    async fn detect_keywords(&self, clip_id: bson::oid::ObjectId, transcript: &str) {
        let enabled = match self.keywords.list_enabled().await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Keyword list unavailable, skipping detection");
                return;
            }
        };
        let now = Utc::now();
        for keyword in keywords::find_matches(transcript, &enabled) {
            let Some(keyword_id) = keyword.id else { continue };
            if let Err(e) = self.keywords.record_detection(keyword_id, now).await {
                warn!(keyword = %keyword.phrase, error = %e, "Failed to record detection");
            }
            self.bus.publish(Event::KeywordDetected(KeywordDetectedEvent {
                clip_id: clip_id.to_hex(),
                keyword_id: keyword_id.to_hex(),
                phrase: keyword.phrase.clone(),
                category: keyword.category.clone(),
                priority: keyword.priority,
                detected_at: now,
            }));
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    }
}

/// Clamps engine segments into `[0, duration]`, orders them by start time
/// and resolves overlaps in favour of the earlier segment.
fn sanitize_segments(raw: Vec<RawSegment>, duration: f64) -> Vec<TranscriptSegment> {
    let limit = if duration > 0.0 { duration } else { f64::MAX };
    let mut raw: Vec<RawSegment> = raw
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect();
    raw.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut out = Vec::with_capacity(raw.len());
    let mut prev_end = 0.0f64;
    for seg in raw {
        let start = seg.start.clamp(0.0, limit).max(prev_end);
        let end = seg.end.clamp(0.0, limit);
        if end <= start {
            continue;
        }
        prev_end = end;
        out.push(TranscriptSegment {
            id: Uuid::new_v4().to_string(),
            start_time: start,
            end_time: end,
            text: seg.text.trim().to_string(),
            confidence: seg.confidence.clamp(0.0, 1.0),
            speaker_id: None,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use bson::oid::ObjectId;
    use parking_lot::Mutex;

    use homemic_db::models::{ClipStatus, Keyword};
    use homemic_transcription::TranscriberOutput;

    use crate::store::memory::{MemoryClipStore, MemoryKeywordStore};

    /// Plays back a queue of canned transcription results.
    struct ScriptedTranscriber {
        script: Mutex<Vec<Result<Vec<RawSegment>, String>>>,
    }

    impl ScriptedTranscriber {
        fn new(script: Vec<Result<Vec<RawSegment>, String>>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl Transcriber for ScriptedTranscriber {
        async fn transcribe(&self, _request: TranscribeRequest) -> anyhow::Result<TranscriberOutput> {
            let next = self.script.lock().pop();
            match next {
                Some(Ok(segments)) => Ok(TranscriberOutput {
                    segments,
                    language: Some("en".to_string()),
                }),
                Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
                None => Err(anyhow::anyhow!("script exhausted")),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn seg(start: f64, end: f64, text: &str) -> RawSegment {
        RawSegment {
            start,
            end,
            text: text.to_string(),
            confidence: 0.9,
        }
    }

    fn pending_clip() -> Clip {
        let now = Utc::now();
        Clip {
            id: None,
            node_id: "kitchen".to_string(),
            filename: "clip.wav".to_string(),
            file_path: Some("/tmp/clip.wav".to_string()),
            file_size: 2048,
            duration_seconds: 120.0,
            recorded_at: bson::DateTime::from_chrono(now),
            uploaded_at: bson::DateTime::from_chrono(now),
            processed_at: None,
            status: ClipStatus::Pending,
            attempts: 0,
            next_attempt_at: None,
            lease: None,
            error_message: None,
            processing_duration_ms: None,
            transcript_text: None,
            word_count: 0,
            display_name: None,
            notes: None,
            segments: vec![],
        }
    }

    fn keyword(phrase: &str, enabled: bool) -> Keyword {
        Keyword {
            id: Some(ObjectId::new()),
            phrase: phrase.to_string(),
            category: Some("household".to_string()),
            priority: 5,
            case_sensitive: false,
            enabled,
            detection_count: 0,
            last_detected: None,
            created_at: bson::DateTime::now(),
        }
    }

    struct Fixture {
        store: Arc<MemoryClipStore>,
        keywords: Arc<MemoryKeywordStore>,
        coordinator: Arc<TranscriptionCoordinator>,
        bus: EventBus,
    }

    fn fixture(
        script: Vec<Result<Vec<RawSegment>, String>>,
        kws: Vec<Keyword>,
        max_attempts: u32,
    ) -> Fixture {
        let store = Arc::new(MemoryClipStore::new());
        let keywords = Arc::new(MemoryKeywordStore::new(kws));
        let bus = EventBus::new(64);
        let config = CoordinatorConfig {
            workers: 1,
            poll_interval: Duration::from_millis(5),
            lease_ttl: Duration::from_secs(300),
            lease_renew: Duration::from_secs(60),
            reclaim_interval: Duration::from_secs(60),
            retry: RetryPolicy {
                max_attempts,
                // Zero backoff keeps retried clips immediately claimable.
                base_backoff: Duration::ZERO,
            },
            language_hint: None,
        };
        let coordinator = TranscriptionCoordinator::new(
            store.clone(),
            keywords.clone(),
            Arc::new(ScriptedTranscriber::new(script)),
            bus.clone(),
            config,
        );
        Fixture {
            store,
            keywords,
            coordinator,
            bus,
        }
    }

    #[tokio::test]
    async fn successful_clip_lands_transcribed_with_ordered_events() {
        let kws = vec![keyword("coffee", true)];
        let kw_id = kws[0].id.unwrap();
        let f = fixture(
            vec![Ok(vec![
                seg(60.0, 130.0, "the coffee is ready"), // runs past clip end
                seg(0.0, 4.2, "good morning"),
            ])],
            kws,
            3,
        );
        let mut rx = f.bus.subscribe();
        let id = f.store.insert(pending_clip()).await.unwrap();

        assert!(f.coordinator.process_next().await.unwrap());
        assert!(!f.coordinator.process_next().await.unwrap());

        let clip = f.store.snapshot(id).unwrap();
        assert_eq!(clip.status, ClipStatus::Transcribed);
        assert_eq!(clip.segments.len(), 2);
        // Sorted, clamped, non-overlapping.
        assert!(clip.segments[0].start_time < clip.segments[1].start_time);
        assert!(clip.segments[1].end_time <= 120.0);
        assert_eq!(clip.word_count, 6);
        assert!(clip.lease.is_none());
        assert!(clip.processed_at.is_some());

        // Transcription strictly precedes the keyword detection.
        match rx.recv().await.unwrap() {
            Event::Transcription(t) => {
                assert_eq!(t.clip_id, id.to_hex());
                assert_eq!(t.node_id, "kitchen");
                assert_eq!(t.word_count, 6);
            }
            other => panic!("expected transcription first, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            Event::KeywordDetected(k) => {
                assert_eq!(k.phrase, "coffee");
                assert_eq!(k.clip_id, id.to_hex());
            }
            other => panic!("expected keyword detection, got {other:?}"),
        }
        assert_eq!(f.keywords.detection_count(kw_id), 1);
    }

    #[tokio::test]
    async fn failures_requeue_then_exhaust() {
        // Script plays back-to-front: two failures.
        let f = fixture(
            vec![Err("engine crashed".to_string()), Err("engine crashed".to_string())],
            vec![],
            2,
        );
        let mut rx = f.bus.subscribe();
        let id = f.store.insert(pending_clip()).await.unwrap();

        assert!(f.coordinator.process_next().await.unwrap());
        let clip = f.store.snapshot(id).unwrap();
        assert_eq!(clip.status, ClipStatus::Pending);
        assert_eq!(clip.attempts, 1);
        assert_eq!(clip.error_message.as_deref(), Some("engine crashed"));

        assert!(f.coordinator.process_next().await.unwrap());
        let clip = f.store.snapshot(id).unwrap();
        assert_eq!(clip.status, ClipStatus::Failed);
        assert_eq!(clip.attempts, 2);

        // Terminal failure: nothing more to claim, no events published.
        assert!(!f.coordinator.process_next().await.unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn manual_retry_gives_a_fresh_attempt_budget() {
        let f = fixture(
            vec![
                Ok(vec![seg(0.0, 2.0, "hello again")]),
                Err("boom".to_string()),
            ],
            vec![],
            1,
        );
        let id = f.store.insert(pending_clip()).await.unwrap();

        assert!(f.coordinator.process_next().await.unwrap());
        assert_eq!(f.store.snapshot(id).unwrap().status, ClipStatus::Failed);

        assert!(f.store.retry(id, Utc::now()).await.unwrap());
        assert!(f.coordinator.process_next().await.unwrap());
        let clip = f.store.snapshot(id).unwrap();
        assert_eq!(clip.status, ClipStatus::Transcribed);
        assert_eq!(clip.transcript_text.as_deref(), Some("hello again"));
    }

    #[tokio::test]
    async fn disabled_keywords_do_not_fire() {
        let kws = vec![keyword("coffee", false)];
        let kw_id = kws[0].id.unwrap();
        let f = fixture(vec![Ok(vec![seg(0.0, 2.0, "coffee time")])], kws, 3);
        let mut rx = f.bus.subscribe();
        f.store.insert(pending_clip()).await.unwrap();

        assert!(f.coordinator.process_next().await.unwrap());
        assert!(matches!(rx.recv().await.unwrap(), Event::Transcription(_)));
        assert!(rx.try_recv().is_err());
        assert_eq!(f.keywords.detection_count(kw_id), 0);
    }

    #[tokio::test]
    async fn empty_transcription_still_completes() {
        let f = fixture(vec![Ok(vec![])], vec![], 3);
        let id = f.store.insert(pending_clip()).await.unwrap();

        assert!(f.coordinator.process_next().await.unwrap());
        let clip = f.store.snapshot(id).unwrap();
        assert_eq!(clip.status, ClipStatus::Transcribed);
        assert_eq!(clip.word_count, 0);
        assert!(clip.segments.is_empty());
    }

    #[test]
    fn sanitize_drops_inverted_and_clamps() {
        let out = sanitize_segments(
            vec![
                seg(5.0, 3.0, "inverted"),
                seg(-2.0, 4.0, "negative start"),
                seg(118.0, 140.0, "runs long"),
                seg(2.0, 6.0, "overlaps previous"),
            ],
            120.0,
        );
        assert_eq!(out.len(), 3);
        assert!((out[0].start_time - 0.0).abs() < f64::EPSILON);
        // Overlap resolved in favour of the earlier segment.
        assert!(out[1].start_time >= out[0].end_time);
        assert!(out[2].end_time <= 120.0);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "ä".repeat(300);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 1); // plus ellipsis
        assert!(p.ends_with('…'));
        assert_eq!(preview("short"), "short");
    }
}
