use axum::{
    Json,
    extract::{Path, State},
};
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use homemic_db::models::Keyword;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct KeywordResponse {
    pub id: String,
    pub phrase: String,
    pub category: Option<String>,
    pub priority: i32,
    pub case_sensitive: bool,
    pub enabled: bool,
    pub detection_count: i64,
    pub last_detected: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn to_response(keyword: Keyword) -> KeywordResponse {
    KeywordResponse {
        id: keyword.id.map(|id| id.to_hex()).unwrap_or_default(),
        phrase: keyword.phrase,
        category: keyword.category,
        priority: keyword.priority,
        case_sensitive: keyword.case_sensitive,
        enabled: keyword.enabled,
        detection_count: keyword.detection_count,
        last_detected: keyword.last_detected.map(|d| d.to_chrono()),
        created_at: keyword.created_at.to_chrono(),
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<KeywordResponse>>, ApiError> {
    let keywords = state.keywords.find_all().await?;
    Ok(Json(keywords.into_iter().map(to_response).collect()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateKeywordRequest {
    #[validate(length(min = 1, max = 200))]
    pub phrase: String,
    pub category: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub case_sensitive: bool,
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateKeywordRequest>,
) -> Result<Json<KeywordResponse>, ApiError> {
    body.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let keyword = state
        .keywords
        .create(body.phrase, body.category, body.priority, body.case_sensitive)
        .await?;
    Ok(Json(to_response(keyword)))
}

#[derive(Debug, Deserialize)]
pub struct ToggleKeywordRequest {
    pub enabled: bool,
}

pub async fn toggle(
    State(state): State<AppState>,
    Path(keyword_id): Path<String>,
    Json(body): Json<ToggleKeywordRequest>,
) -> Result<Json<KeywordResponse>, ApiError> {
    let id = parse_id(&keyword_id)?;
    let keyword = state.keywords.set_enabled(id, body.enabled).await?;
    Ok(Json(to_response(keyword)))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(keyword_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&keyword_id)?;
    if !state.keywords.delete(id).await? {
        return Err(ApiError::NotFound(format!("Keyword {keyword_id} not found")));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

fn parse_id(raw: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid keyword id: {raw}")))
}
