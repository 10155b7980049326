use axum::{
    Json,
    extract::{Path, State},
};
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use homemic_db::models::Speaker;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct SpeakerResponse {
    pub id: String,
    pub name: String,
    pub color: String,
    pub sample_count: i32,
    pub enrolled_at: DateTime<Utc>,
}

fn to_response(speaker: Speaker) -> SpeakerResponse {
    SpeakerResponse {
        id: speaker.id.map(|id| id.to_hex()).unwrap_or_default(),
        name: speaker.name,
        color: speaker.color,
        sample_count: speaker.sample_count,
        enrolled_at: speaker.enrolled_at.to_chrono(),
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<SpeakerResponse>>, ApiError> {
    let speakers = state.speakers.find_all().await?;
    Ok(Json(speakers.into_iter().map(to_response).collect()))
}

#[derive(Debug, Deserialize)]
pub struct CreateSpeakerRequest {
    pub name: String,
    pub color: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateSpeakerRequest>,
) -> Result<Json<SpeakerResponse>, ApiError> {
    let color = body.color.unwrap_or_else(|| "#4f6d7a".to_string());
    let speaker = state.speakers.create(body.name, color).await?;
    Ok(Json(to_response(speaker)))
}

/// Deletes a speaker and clears its segment attributions across all clips.
pub async fn remove(
    State(state): State<AppState>,
    Path(speaker_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = ObjectId::parse_str(&speaker_id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid speaker id: {speaker_id}")))?;
    if !state.speakers.delete(id).await? {
        return Err(ApiError::NotFound(format!("Speaker {speaker_id} not found")));
    }
    let cleared = state.clips.clear_speaker_refs(id).await?;
    info!(speaker = %speaker_id, clips_touched = cleared, "Speaker deleted");
    Ok(Json(serde_json::json!({
        "deleted": true,
        "clips_touched": cleared,
    })))
}
