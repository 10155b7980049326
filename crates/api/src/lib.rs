pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    routing::{delete, get, patch, post, put},
};
use tracing::warn;
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload = state.settings.storage.max_upload_bytes as usize;

    // Clip ingestion and history
    let batch_routes = Router::new()
        .route(
            "/upload",
            post(routes::batch::upload).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/history", get(routes::batch::history))
        .route("/bulk/delete", post(routes::batch::bulk_delete))
        .route("/bulk/export", post(routes::batch::bulk_export))
        .route("/clips/{clip_id}", get(routes::batch::get_clip))
        .route("/clips/{clip_id}", patch(routes::batch::update_metadata))
        .route("/clips/{clip_id}/audio", get(routes::batch::audio))
        .route("/clips/{clip_id}/export", get(routes::batch::export))
        .route("/clips/{clip_id}/retry", post(routes::batch::retry))
        .route(
            "/segments/{segment_id}/speaker",
            patch(routes::batch::reassign_speaker),
        );

    let node_routes = Router::new()
        .route("/", get(routes::nodes::list))
        .route("/{node_id}", get(routes::nodes::get))
        .route("/{node_id}", put(routes::nodes::update))
        .route("/{node_id}", delete(routes::nodes::disable))
        .route("/{node_id}/heartbeat", post(routes::nodes::heartbeat));

    let keyword_routes = Router::new()
        .route("/", get(routes::keywords::list))
        .route("/", post(routes::keywords::create))
        .route("/{keyword_id}/toggle", put(routes::keywords::toggle))
        .route("/{keyword_id}", delete(routes::keywords::remove));

    let privacy_routes = Router::new()
        .route("/mute/{node_id}", post(routes::privacy::mute_node))
        .route("/unmute/{node_id}", post(routes::privacy::unmute_node))
        .route("/mute-all", post(routes::privacy::mute_all))
        .route("/unmute-all", post(routes::privacy::unmute_all))
        .route("/status/{node_id}", get(routes::privacy::node_status))
        .route("/rules", get(routes::privacy::rules))
        .route("/quiet-hours", put(routes::privacy::set_quiet_hours));

    let speaker_routes = Router::new()
        .route("/", get(routes::speakers::list))
        .route("/", post(routes::speakers::create))
        .route("/{speaker_id}", delete(routes::speakers::remove));

    let api = Router::new()
        .nest("/batch", batch_routes)
        .nest("/nodes", node_routes)
        .nest("/keywords", keyword_routes)
        .nest("/privacy", privacy_routes)
        .nest("/speakers", speaker_routes);

    Router::new()
        .nest("/api", api)
        .route("/health", get(health_check))
        .route("/ws", get(ws::handler::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Liveness plus a database ping and blob-store totals. A dead database
/// degrades the report instead of failing the request.
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let db = match state.db.run_command(bson::doc! { "ping": 1 }).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!(error = %e, "Health check: database ping failed");
            "unreachable"
        }
    };
    let storage = match state.storage.stats().await {
        Ok(stats) => serde_json::json!(stats),
        Err(e) => {
            warn!(error = %e, "Health check: storage stats failed");
            serde_json::json!({ "error": e.to_string() })
        }
    };
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "db": db,
        "storage": storage,
    }))
}
