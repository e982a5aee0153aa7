use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{health, mappings, replay, training};
use super::state::AppState;
use super::websocket::ws_handler;

pub fn create_router(state: Arc<AppState>) -> Router {
    // The sidecar is only reachable from local UIs
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:1420"),
            HeaderValue::from_static("http://localhost:5173"),
            HeaderValue::from_static("http://127.0.0.1:1420"),
            HeaderValue::from_static("http://127.0.0.1:5173"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Training
        .route("/recordings/train", post(training::train_recording))
        // Mapping store
        .route("/mappings", get(mappings::list_mappings))
        .route("/mappings/stats", get(mappings::mapping_stats))
        .route("/mappings/search", get(mappings::search_mappings))
        .route("/mappings/import", post(mappings::import_mappings))
        .route(
            "/mappings/:origin",
            get(mappings::get_mappings).delete(mappings::delete_mappings),
        )
        .route("/mappings/:origin/analyze", post(mappings::analyze_mappings))
        .route("/mappings/:origin/export", get(mappings::export_mappings))
        // Replay
        .route("/replay", post(replay::start_replay))
        .route("/replay/:session_id", get(replay::get_replay_status))
        .route("/replay/:session_id/cancel", post(replay::cancel_replay))
        .route("/replay/:session_id/captcha", post(replay::resolve_captcha))
        // WebSocket
        .route("/ws/:client_id", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
