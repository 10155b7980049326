use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// Processing state of an uploaded clip.
///
/// Transitions are monotonic forward (`pending → processing → transcribed`
/// or `→ failed`) except for the explicit `failed → pending` retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipStatus {
    Pending,
    Processing,
    Transcribed,
    Failed,
}

impl ClipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipStatus::Pending => "pending",
            ClipStatus::Processing => "processing",
            ClipStatus::Transcribed => "transcribed",
            ClipStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ClipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClipStatus::Pending),
            "processing" => Ok(ClipStatus::Processing),
            "transcribed" => Ok(ClipStatus::Transcribed),
            "failed" => Ok(ClipStatus::Failed),
            other => Err(format!("unknown clip status: {other}")),
        }
    }
}

/// Exclusive claim a worker holds while a clip is `processing`.
///
/// A lease whose `expires_at` has passed is abandoned; the reclaim sweep
/// reverts the clip to `pending` so it is never stuck in `processing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerLease {
    pub id: String,
    pub expires_at: DateTime,
}

/// A time-bounded slice of a clip's transcript.
///
/// Segments are created as a batch when the clip completes transcription
/// and are immutable afterwards, except for speaker reassignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: String,
    /// Seconds from clip start. `0 <= start_time <= end_time <= duration`.
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub speaker_id: Option<ObjectId>,
}

/// One fixed-duration audio recording uploaded by a node.
///
/// Segments are embedded so that segment persistence and the status flip to
/// `transcribed` are a single atomic document update guarded by the lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub node_id: String,

    pub filename: String,
    /// Blob path on disk; cleared when the retention sweep reaps the audio.
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_size: i64,
    #[serde(default)]
    pub duration_seconds: f64,

    pub recorded_at: DateTime,
    pub uploaded_at: DateTime,
    pub processed_at: Option<DateTime>,

    pub status: ClipStatus,
    #[serde(default)]
    pub attempts: i32,
    /// Earliest time a retried clip may be claimed again (backoff).
    pub next_attempt_at: Option<DateTime>,
    pub lease: Option<WorkerLease>,
    pub error_message: Option<String>,
    pub processing_duration_ms: Option<i64>,

    pub transcript_text: Option<String>,
    #[serde(default)]
    pub word_count: i32,

    // User-editable metadata; never touched by the pipeline.
    pub display_name: Option<String>,
    pub notes: Option<String>,

    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

impl Clip {
    pub const COLLECTION: &'static str = "clips";
}
