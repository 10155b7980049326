use std::collections::HashMap;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use homemic_db::models::{Clip, ClipStatus, TranscriptSegment};
use homemic_services::dao::base::PaginationParams;
use homemic_services::privacy::Admission;
use homemic_services::store::ClipStore;
use homemic_services::store::mongo::ClipQuery;
use homemic_transcription::export::{ExportDocument, ExportFormat, ExportSegment, render};
use homemic_transcription::wav;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct SegmentResponse {
    pub id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub confidence: f64,
    pub speaker_id: Option<String>,
}

impl From<&TranscriptSegment> for SegmentResponse {
    fn from(seg: &TranscriptSegment) -> Self {
        Self {
            id: seg.id.clone(),
            start_time: seg.start_time,
            end_time: seg.end_time,
            text: seg.text.clone(),
            confidence: seg.confidence,
            speaker_id: seg.speaker_id.map(|id| id.to_hex()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClipResponse {
    pub id: String,
    pub node_id: String,
    pub filename: String,
    pub status: &'static str,
    pub file_size: i64,
    pub duration_seconds: f64,
    pub recorded_at: DateTime<Utc>,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub error_message: Option<String>,
    pub processing_duration_ms: Option<i64>,
    pub transcript_text: Option<String>,
    pub word_count: i32,
    pub display_name: Option<String>,
    pub notes: Option<String>,
    pub has_audio: bool,
    pub segments: Vec<SegmentResponse>,
}

fn to_response(clip: &Clip) -> ClipResponse {
    ClipResponse {
        id: clip.id.map(|id| id.to_hex()).unwrap_or_default(),
        node_id: clip.node_id.clone(),
        filename: clip.filename.clone(),
        status: clip.status.as_str(),
        file_size: clip.file_size,
        duration_seconds: clip.duration_seconds,
        recorded_at: clip.recorded_at.to_chrono(),
        uploaded_at: clip.uploaded_at.to_chrono(),
        processed_at: clip.processed_at.map(|d| d.to_chrono()),
        attempts: clip.attempts,
        error_message: clip.error_message.clone(),
        processing_duration_ms: clip.processing_duration_ms,
        transcript_text: clip.transcript_text.clone(),
        word_count: clip.word_count,
        display_name: clip.display_name.clone(),
        notes: clip.notes.clone(),
        has_audio: clip.file_path.is_some(),
        segments: clip.segments.iter().map(SegmentResponse::from).collect(),
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub clip_id: String,
    pub status: &'static str,
    pub suppressed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Multipart clip upload from a node: `file` plus `node_id`, and optional
/// `recorded_at` (RFC 3339) and `duration_seconds` fields.
///
/// The privacy gate runs here, once. A suppressed upload still stores the
/// audio and the clip row (terminal `failed`) so the suppression is
/// auditable, but the clip is never enqueued for transcription.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut node_id: Option<String> = None;
    let mut recorded_at: Option<DateTime<Utc>> = None;
    let mut duration_param: Option<f64> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ApiError::BadRequest("File part needs a filename".to_string()))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {e}")))?;
                file = Some((filename, bytes.to_vec()));
            }
            "node_id" => {
                node_id = Some(read_text_field(field).await?);
            }
            "recorded_at" => {
                let raw = read_text_field(field).await?;
                let parsed = DateTime::parse_from_rfc3339(&raw)
                    .map_err(|_| ApiError::BadRequest(format!("Invalid recorded_at: {raw}")))?;
                recorded_at = Some(parsed.with_timezone(&Utc));
            }
            "duration_seconds" => {
                let raw = read_text_field(field).await?;
                let parsed: f64 = raw.parse().map_err(|_| {
                    ApiError::BadRequest(format!("Invalid duration_seconds: {raw}"))
                })?;
                if !parsed.is_finite() || parsed <= 0.0 {
                    return Err(ApiError::BadRequest(format!(
                        "duration_seconds must be positive: {raw}"
                    )));
                }
                duration_param = Some(parsed);
            }
            other => warn!(field = other, "Ignoring unknown upload field"),
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("Missing file part".to_string()))?;
    let node_id = node_id.ok_or_else(|| ApiError::BadRequest("Missing node_id".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }
    if bytes.len() as u64 > state.settings.storage.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "Upload exceeds {} bytes",
            state.settings.storage.max_upload_bytes
        )));
    }

    let info = wav::probe(&bytes)?;
    let duration = duration_param.unwrap_or(info.duration_seconds);
    if let Some(reported) = duration_param {
        let drift = (reported - info.duration_seconds).abs();
        if drift > (info.duration_seconds * 0.1).max(1.0) {
            warn!(
                node = %node_id,
                reported,
                probed = info.duration_seconds,
                "Reported duration disagrees with WAV header"
            );
        }
    }
    let now = Utc::now();
    let recorded_at = recorded_at.unwrap_or(now);

    let node = state
        .nodes
        .register_if_missing(&node_id, bson::DateTime::from_chrono(now))
        .await?;
    if node.disabled_at.is_some() {
        return Err(ApiError::Conflict(format!("Node {node_id} is disabled")));
    }
    let status = state.health.observe(&node_id, now, node.latency_ms, now);
    state
        .nodes
        .record_contact(&node_id, None, status, bson::DateTime::from_chrono(now))
        .await?;

    let rules = state.privacy.rule_set().await?;
    match rules.admit(&node_id, now) {
        Admission::Admitted => {
            let blob = state
                .storage
                .save(&node_id, recorded_at, &filename, &bytes)
                .await?;
            let clip = new_clip(
                &node_id,
                &filename,
                Some(blob.path.display().to_string()),
                blob.size as i64,
                duration,
                recorded_at,
                now,
                ClipStatus::Pending,
                None,
            );
            let id = state.clips.insert(clip).await?;
            state.pipeline_wake.notify_one();
            info!(clip = %id, node = %node_id, "Clip accepted for transcription");
            Ok(Json(UploadResponse {
                clip_id: id.to_hex(),
                status: ClipStatus::Pending.as_str(),
                suppressed: false,
                reason: None,
            }))
        }
        Admission::Suppressed(reason) => {
            // The blob is kept for audit; the clip is terminal and never
            // enqueued, so nothing downstream will transcribe it.
            let blob = state
                .storage
                .save(&node_id, recorded_at, &filename, &bytes)
                .await?;
            let clip = new_clip(
                &node_id,
                &filename,
                Some(blob.path.display().to_string()),
                blob.size as i64,
                duration,
                recorded_at,
                now,
                ClipStatus::Failed,
                Some(reason.to_string()),
            );
            let id = state.clips.insert(clip).await?;
            info!(clip = %id, node = %node_id, %reason, "Clip suppressed by privacy gate");
            Ok(Json(UploadResponse {
                clip_id: id.to_hex(),
                status: ClipStatus::Failed.as_str(),
                suppressed: true,
                reason: Some(reason.to_string()),
            }))
        }
    }
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed field: {e}")))
}

#[allow(clippy::too_many_arguments)]
fn new_clip(
    node_id: &str,
    filename: &str,
    file_path: Option<String>,
    file_size: i64,
    duration: f64,
    recorded_at: DateTime<Utc>,
    now: DateTime<Utc>,
    status: ClipStatus,
    error_message: Option<String>,
) -> Clip {
    Clip {
        id: None,
        node_id: node_id.to_string(),
        filename: filename.to_string(),
        file_path,
        file_size,
        duration_seconds: duration,
        recorded_at: bson::DateTime::from_chrono(recorded_at),
        uploaded_at: bson::DateTime::from_chrono(now),
        processed_at: None,
        status,
        attempts: 0,
        next_attempt_at: None,
        lease: None,
        error_message,
        processing_duration_ms: None,
        transcript_text: None,
        word_count: 0,
        display_name: None,
        notes: None,
        segments: vec![],
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub node_id: Option<String>,
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub clips: Vec<ClipResponse>,
    pub total: u64,
    pub limit: i64,
    pub offset: u64,
}

pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(|s| s.parse::<ClipStatus>().map_err(ApiError::BadRequest))
        .transpose()?;
    let query = ClipQuery {
        node_id: params.node_id,
        status,
        recorded_after: params.from,
        recorded_before: params.to,
        search: params.search,
    };
    let pagination = PaginationParams {
        offset: params.offset.unwrap_or(0),
        limit: params.limit.unwrap_or(50).clamp(1, 500),
    };
    let page = state.clips.history(&query, &pagination).await?;
    Ok(Json(HistoryResponse {
        clips: page.items.iter().map(to_response).collect(),
        total: page.total,
        limit: pagination.limit,
        offset: pagination.offset,
    }))
}

pub async fn get_clip(
    State(state): State<AppState>,
    Path(clip_id): Path<String>,
) -> Result<Json<ClipResponse>, ApiError> {
    let id = parse_clip_id(&clip_id)?;
    let clip = state.clips.find_by_id(id).await?;
    Ok(Json(to_response(&clip)))
}

/// Streams the stored WAV back, e.g. for playback in the dashboard.
pub async fn audio(
    State(state): State<AppState>,
    Path(clip_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_clip_id(&clip_id)?;
    let clip = state.clips.find_by_id(id).await?;
    let path = clip
        .file_path
        .ok_or_else(|| ApiError::NotFound("Audio has been reaped by retention".to_string()))?;
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ApiError::NotFound("Audio blob is missing from disk".to_string())
        } else {
            ApiError::Internal(e.to_string())
        }
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/wav"));
    if let Ok(value) = HeaderValue::from_str(&format!(
        "inline; filename=\"{}\"",
        clip.filename.replace('"', "")
    )) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok((headers, bytes).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

pub async fn export(
    State(state): State<AppState>,
    Path(clip_id): Path<String>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let id = parse_clip_id(&clip_id)?;
    let format: ExportFormat = params
        .format
        .as_deref()
        .unwrap_or("txt")
        .parse()
        .map_err(ApiError::BadRequest)?;
    let clip = state.clips.find_by_id(id).await?;
    if clip.status != ClipStatus::Transcribed {
        return Err(ApiError::Conflict("Clip has no transcript yet".to_string()));
    }
    let speakers = speaker_names(&state).await?;
    let doc = export_document(&clip, &speakers);
    let body = render(&doc, format);
    let filename = format!(
        "{}.{}",
        clip.display_name.as_deref().unwrap_or(&clip.filename),
        format.extension()
    );
    Ok(export_response(body, format, &filename))
}

fn export_response(body: String, format: ExportFormat, filename: &str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );
    if let Ok(value) = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        filename.replace('"', "")
    )) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    (headers, body).into_response()
}

async fn speaker_names(state: &AppState) -> Result<HashMap<ObjectId, String>, ApiError> {
    Ok(state
        .speakers
        .find_all()
        .await?
        .into_iter()
        .filter_map(|s| s.id.map(|id| (id, s.name)))
        .collect())
}

fn export_document(clip: &Clip, speakers: &HashMap<ObjectId, String>) -> ExportDocument {
    ExportDocument {
        title: clip
            .display_name
            .clone()
            .unwrap_or_else(|| clip.filename.clone()),
        recorded_at: clip.recorded_at.to_chrono().to_rfc3339(),
        duration_seconds: clip.duration_seconds,
        segments: clip
            .segments
            .iter()
            .map(|seg| ExportSegment {
                start: seg.start_time,
                end: seg.end_time,
                text: seg.text.clone(),
                speaker: seg.speaker_id.and_then(|id| speakers.get(&id).cloned()),
            })
            .collect(),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateClipRequest {
    pub display_name: Option<String>,
    pub notes: Option<String>,
}

pub async fn update_metadata(
    State(state): State<AppState>,
    Path(clip_id): Path<String>,
    Json(body): Json<UpdateClipRequest>,
) -> Result<Json<ClipResponse>, ApiError> {
    let id = parse_clip_id(&clip_id)?;
    let clip = state
        .clips
        .update_metadata(id, body.display_name, body.notes)
        .await?;
    Ok(Json(to_response(&clip)))
}

pub async fn retry(
    State(state): State<AppState>,
    Path(clip_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_clip_id(&clip_id)?;
    let requeued = ClipStore::retry(state.clips.as_ref(), id, Utc::now()).await?;
    if !requeued {
        return Err(ApiError::Conflict(
            "Only failed, non-suppressed clips can be retried".to_string(),
        ));
    }
    state.pipeline_wake.notify_one();
    Ok(Json(serde_json::json!({ "requeued": true })))
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub clip_ids: Vec<String>,
}

pub async fn bulk_delete(
    State(state): State<AppState>,
    Json(body): Json<BulkDeleteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ids = parse_clip_ids(&body.clip_ids)?;
    let (deleted, paths) = state.clips.delete_many(&ids).await?;
    let mut blobs_removed = 0u64;
    for path in paths {
        match state.storage.remove(std::path::Path::new(&path)).await {
            Ok(()) => blobs_removed += 1,
            Err(e) => warn!(%path, error = %e, "Failed to remove audio blob"),
        }
    }
    Ok(Json(serde_json::json!({
        "deleted": deleted,
        "blobs_removed": blobs_removed,
    })))
}

#[derive(Debug, Deserialize)]
pub struct BulkExportRequest {
    pub clip_ids: Vec<String>,
    pub format: Option<String>,
}

/// Concatenates the transcripts of several clips into one download.
pub async fn bulk_export(
    State(state): State<AppState>,
    Json(body): Json<BulkExportRequest>,
) -> Result<Response, ApiError> {
    let ids = parse_clip_ids(&body.clip_ids)?;
    let format: ExportFormat = body
        .format
        .as_deref()
        .unwrap_or("txt")
        .parse()
        .map_err(ApiError::BadRequest)?;
    let clips = state.clips.find_by_ids(&ids).await?;
    let speakers = speaker_names(&state).await?;
    let docs: Vec<ExportDocument> = clips
        .iter()
        .filter(|c| c.status == ClipStatus::Transcribed)
        .map(|c| export_document(c, &speakers))
        .collect();
    if docs.is_empty() {
        return Err(ApiError::NotFound(
            "None of the requested clips have transcripts".to_string(),
        ));
    }

    let body = match format {
        ExportFormat::Json => {
            serde_json::to_string_pretty(&docs).map_err(|e| ApiError::Internal(e.to_string()))?
        }
        _ => docs
            .iter()
            .map(|d| render(d, format))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    let filename = format!("transcripts.{}", format.extension());
    Ok(export_response(body, format, &filename))
}

#[derive(Debug, Deserialize)]
pub struct ReassignSpeakerRequest {
    /// Hex speaker id, or `null` to clear the attribution.
    pub speaker_id: Option<String>,
}

pub async fn reassign_speaker(
    State(state): State<AppState>,
    Path(segment_id): Path<String>,
    Json(body): Json<ReassignSpeakerRequest>,
) -> Result<Json<ClipResponse>, ApiError> {
    let speaker_id = body
        .speaker_id
        .as_deref()
        .map(|s| {
            ObjectId::parse_str(s)
                .map_err(|_| ApiError::BadRequest(format!("Invalid speaker_id: {s}")))
        })
        .transpose()?;
    if let Some(id) = speaker_id {
        // Reject references to speakers that do not exist.
        state.speakers.get(id).await?;
    }
    let clip = state.clips.reassign_speaker(&segment_id, speaker_id).await?;
    Ok(Json(to_response(&clip)))
}

fn parse_clip_id(raw: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid clip id: {raw}")))
}

fn parse_clip_ids(raw: &[String]) -> Result<Vec<ObjectId>, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::BadRequest("clip_ids must not be empty".to_string()));
    }
    raw.iter().map(|s| parse_clip_id(s)).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tokio::sync::Notify;
    use tower::ServiceExt;

    use homemic_config::Settings;
    use homemic_services::events::EventBus;

    use crate::build_router;
    use crate::state::AppState;

    const BOUNDARY: &str = "x-homemic-upload";
    const MAX_UPLOAD: u64 = 64 * 1024;

    /// Router over an unreachable database. Every request here must be
    /// rejected by validation before any collection is touched.
    async fn test_router() -> axum::Router {
        let mut settings = Settings::load().unwrap();
        settings.storage.max_upload_bytes = MAX_UPLOAD;
        let client = mongodb::Client::with_uri_str(
            "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=50&connectTimeoutMS=50",
        )
        .await
        .unwrap();
        let db = client.database("homemic_test");
        let bus = EventBus::new(settings.realtime.event_buffer);
        build_router(AppState::new(
            Arc::new(settings),
            &db,
            bus,
            Arc::new(Notify::new()),
        ))
    }

    fn text_part(name: &str, value: &str) -> Vec<u8> {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
        .into_bytes()
    }

    fn file_part(filename: &str, bytes: &[u8]) -> Vec<u8> {
        let mut part = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: audio/wav\r\n\r\n"
        )
        .into_bytes();
        part.extend_from_slice(bytes);
        part.extend_from_slice(b"\r\n");
        part
    }

    fn multipart_body(parts: Vec<Vec<u8>>) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(&part);
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_upload(body: Vec<u8>) -> (StatusCode, serde_json::Value) {
        let router = test_router().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/batch/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn upload_without_file_part_is_rejected() {
        let body = multipart_body(vec![text_part("node_id", "kitchen")]);
        let (status, json) = post_upload(body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["message"].as_str().unwrap().contains("file"));
    }

    #[tokio::test]
    async fn upload_with_empty_file_is_rejected() {
        let body = multipart_body(vec![
            file_part("clip.wav", b""),
            text_part("node_id", "kitchen"),
        ]);
        let (status, json) = post_upload(body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["message"].as_str().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn upload_with_non_positive_duration_is_rejected() {
        for bad in ["0", "-3.5", "NaN"] {
            let body = multipart_body(vec![
                text_part("duration_seconds", bad),
                file_part("clip.wav", b"RIFF"),
                text_part("node_id", "kitchen"),
            ]);
            let (status, json) = post_upload(body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "duration {bad}");
            assert!(
                json["message"]
                    .as_str()
                    .unwrap()
                    .contains("duration_seconds")
            );
        }
    }

    #[tokio::test]
    async fn upload_with_bad_recorded_at_is_rejected() {
        let body = multipart_body(vec![
            text_part("recorded_at", "yesterday at nine"),
            file_part("clip.wav", b"RIFF"),
            text_part("node_id", "kitchen"),
        ]);
        let (status, json) = post_upload(body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["message"].as_str().unwrap().contains("recorded_at"));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let huge = vec![0u8; MAX_UPLOAD as usize + 1];
        let body = multipart_body(vec![
            file_part("clip.wav", &huge),
            text_part("node_id", "kitchen"),
        ]);
        let (status, _) = post_upload(body).await;
        // The body-size layer may cut the stream before the explicit
        // length check runs; either way the client gets a 4xx.
        assert!(status.is_client_error(), "got {status}");
    }

    #[tokio::test]
    async fn upload_with_non_wav_payload_is_rejected() {
        let body = multipart_body(vec![
            file_part("clip.wav", b"definitely not a riff header"),
            text_part("node_id", "kitchen"),
        ]);
        let (status, _) = post_upload(body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_with_unknown_status_is_rejected() {
        let router = test_router().await;
        let request = Request::builder()
            .uri("/api/batch/history?status=exploded")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_clip_ids_are_rejected() {
        let router = test_router().await;
        for uri in [
            "/api/batch/clips/not-hex",
            "/api/batch/clips/not-hex/audio",
            "/api/batch/clips/not-hex/export",
        ] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }
}
