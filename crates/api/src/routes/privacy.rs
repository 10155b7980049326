use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use homemic_db::models::{PrivacyRule, RuleSpec};
use homemic_services::privacy::Admission;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct RuleResponse {
    pub id: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_minute: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_minute: Option<i32>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

fn to_response(rule: PrivacyRule) -> RuleResponse {
    let id = rule.id.map(|id| id.to_hex()).unwrap_or_default();
    let (kind, node_id, expires_at, reason, start_minute, end_minute) = match rule.spec {
        RuleSpec::NodeMute {
            node_id,
            expires_at,
            reason,
        } => (
            "node_mute",
            Some(node_id),
            expires_at.map(|d| d.to_chrono()),
            reason,
            None,
            None,
        ),
        RuleSpec::GlobalMute { reason } => ("global_mute", None, None, reason, None, None),
        RuleSpec::QuietHours {
            start_minute,
            end_minute,
        } => (
            "quiet_hours",
            None,
            None,
            None,
            Some(start_minute),
            Some(end_minute),
        ),
    };
    RuleResponse {
        id,
        kind,
        node_id,
        expires_at,
        reason,
        start_minute,
        end_minute,
        active: rule.active,
        created_at: rule.created_at.to_chrono(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MuteRequest {
    pub duration_minutes: Option<i64>,
    pub reason: Option<String>,
}

pub async fn mute_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(query): Query<MuteRequest>,
    body: Option<Json<MuteRequest>>,
) -> Result<Json<RuleResponse>, ApiError> {
    // Muting an unknown node is allowed; the rule simply waits for it.
    // The duration rides in the query string or the body, body winning.
    let Json(body) = body.unwrap_or_default();
    let duration = body.duration_minutes.or(query.duration_minutes);
    let reason = body.reason.or(query.reason);
    let rule = state.privacy.mute_node(&node_id, duration, reason).await?;
    info!(node = %node_id, duration_minutes = ?duration, "Node muted");
    Ok(Json(to_response(rule)))
}

pub async fn unmute_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lifted = state.privacy.unmute_node(&node_id).await?;
    info!(node = %node_id, lifted, "Node unmuted");
    Ok(Json(serde_json::json!({ "lifted": lifted })))
}

pub async fn mute_all(
    State(state): State<AppState>,
    body: Option<Json<MuteRequest>>,
) -> Result<Json<RuleResponse>, ApiError> {
    let Json(body) = body.unwrap_or_default();
    let rule = state.privacy.mute_all(body.reason).await?;
    info!("Global mute engaged");
    Ok(Json(to_response(rule)))
}

pub async fn unmute_all(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lifted = state.privacy.unmute_all().await?;
    info!(lifted, "All mutes lifted");
    Ok(Json(serde_json::json!({ "lifted": lifted })))
}

#[derive(Debug, Serialize)]
pub struct NodePrivacyStatus {
    pub node_id: String,
    pub muted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What would happen to an upload from this node right now.
pub async fn node_status(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<NodePrivacyStatus>, ApiError> {
    let rules = state.privacy.rule_set().await?;
    let status = match rules.admit(&node_id, Utc::now()) {
        Admission::Admitted => NodePrivacyStatus {
            node_id,
            muted: false,
            reason: None,
        },
        Admission::Suppressed(reason) => NodePrivacyStatus {
            node_id,
            muted: true,
            reason: Some(reason.to_string()),
        },
    };
    Ok(Json(status))
}

pub async fn rules(State(state): State<AppState>) -> Result<Json<Vec<RuleResponse>>, ApiError> {
    let rules = state.privacy.active_rules().await?;
    Ok(Json(rules.into_iter().map(to_response).collect()))
}

#[derive(Debug, Deserialize)]
pub struct QuietWindowRequest {
    pub start_minute: i32,
    pub end_minute: i32,
}

#[derive(Debug, Deserialize)]
pub struct QuietHoursRequest {
    pub windows: Vec<QuietWindowRequest>,
}

/// Replaces the whole quiet-hours schedule; an empty list clears it.
pub async fn set_quiet_hours(
    State(state): State<AppState>,
    Json(body): Json<QuietHoursRequest>,
) -> Result<Json<Vec<RuleResponse>>, ApiError> {
    let windows = body
        .windows
        .into_iter()
        .map(|w| (w.start_minute, w.end_minute))
        .collect();
    let rules = state.privacy.set_quiet_hours(windows).await?;
    info!(windows = rules.len(), "Quiet hours updated");
    Ok(Json(rules.into_iter().map(to_response).collect()))
}
