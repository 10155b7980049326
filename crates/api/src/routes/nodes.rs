use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use homemic_db::models::Node;
use homemic_services::events::{AudioLevelEvent, Event};

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct NodeResponse {
    pub id: String,
    pub name: String,
    pub location: String,
    pub status: &'static str,
    pub audio_filtering: bool,
    pub latency_ms: f64,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub disabled: bool,
}

fn to_response(node: &Node, state: &AppState, now: DateTime<Utc>) -> NodeResponse {
    // Status is derived fresh on read; the stored value only reflects the
    // last contact.
    let status = state
        .health
        .peek(node.last_seen.to_chrono(), node.latency_ms, now);
    NodeResponse {
        id: node.id.clone(),
        name: node.name.clone(),
        location: node.location.clone(),
        status: status.as_str(),
        audio_filtering: node.audio_filtering,
        latency_ms: node.latency_ms,
        last_seen: node.last_seen.to_chrono(),
        created_at: node.created_at.to_chrono(),
        disabled: node.disabled_at.is_some(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub include_disabled: bool,
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<NodeResponse>>, ApiError> {
    let now = Utc::now();
    let nodes = state.nodes.find_all(params.include_disabled).await?;
    Ok(Json(
        nodes.iter().map(|n| to_response(n, &state, now)).collect(),
    ))
}

pub async fn get(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<NodeResponse>, ApiError> {
    let node = state.nodes.get(&node_id).await?;
    Ok(Json(to_response(&node, &state, Utc::now())))
}

#[derive(Debug, Deserialize)]
pub struct UpdateNodeRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub audio_filtering: Option<bool>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Json(body): Json<UpdateNodeRequest>,
) -> Result<Json<NodeResponse>, ApiError> {
    let node = state
        .nodes
        .update_settings(&node_id, body.name, body.location, body.audio_filtering)
        .await?;
    Ok(Json(to_response(&node, &state, Utc::now())))
}

pub async fn disable(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let disabled = state
        .nodes
        .disable(&node_id, bson::DateTime::now())
        .await?;
    if !disabled {
        return Err(ApiError::NotFound(format!(
            "Node {node_id} not found or already disabled"
        )));
    }
    Ok(Json(serde_json::json!({ "disabled": true })))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub latency_ms: Option<f64>,
    /// Current input level in dBFS, forwarded to dashboards as-is.
    pub audio_level_db: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub status: &'static str,
    pub server_time: DateTime<Utc>,
}

/// Periodic keep-alive from a node agent. Registers unknown nodes on the
/// fly, the same as a first upload would.
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Json(body): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let now = Utc::now();
    let node = state
        .nodes
        .register_if_missing(&node_id, bson::DateTime::from_chrono(now))
        .await?;
    if node.disabled_at.is_some() {
        return Err(ApiError::Conflict(format!("Node {node_id} is disabled")));
    }

    let latency = body.latency_ms.unwrap_or(node.latency_ms);
    let status = state.health.observe(&node_id, now, latency, now);
    state
        .nodes
        .record_contact(&node_id, body.latency_ms, status, bson::DateTime::from_chrono(now))
        .await?;

    if let Some(level_db) = body.audio_level_db {
        debug!(node = %node_id, level_db, "Audio level sample");
        state.bus.publish(Event::AudioLevel(AudioLevelEvent {
            node_id: node_id.clone(),
            level_db,
            at: now,
        }));
    }

    Ok(Json(HeartbeatResponse {
        status: status.as_str(),
        server_time: now,
    }))
}
