//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the engine, broadcaster, and
//! playlist. Streaming handlers live in the sibling `stream` module.

use axum::extract::State;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::response::{api_ok, api_success};
use crate::api::stream::{now_playing_events, playlist_events, stream_audio};
use crate::api::AppState;
use crate::engine::EngineStatus;
use crate::error::RadiocastResult;
use crate::protocol_constants::SERVICE_ID;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
///
/// CORS is permissive: the audio stream and the metadata channels are meant
/// to be consumed by a browser player served from anywhere.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(get_status))
        .route("/api/tracks", get(get_tracks))
        .route("/api/playlist/reorder", post(reorder_playlist))
        .route("/api/playlist/reload", post(reload_playlist))
        .route("/api/skip", post(skip_track))
        .route("/stream", get(stream_audio))
        .route("/events/now-playing", get(now_playing_events))
        .route("/events/playlist", get(playlist_events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe: "Is the process running?"
async fn health_check(State(state): State<AppState>) -> Response {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "engineRunning": state.engine.is_running(),
    }))
}

/// Point-in-time engine snapshot.
async fn get_status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine.status())
}

/// Point-in-time catalog snapshot for REST reads.
async fn get_tracks(State(state): State<AppState>) -> Response {
    let (tracks, current_index) = state.playlist.snapshot();
    api_success(json!({
        "tracks": tracks,
        "currentIndex": current_index,
    }))
}

#[derive(Debug, Deserialize)]
struct ReorderRequest {
    /// New track order: a permutation of the current ids.
    order: Vec<u64>,
}

/// Atomically reorders the playlist; 400 when not a permutation.
async fn reorder_playlist(
    State(state): State<AppState>,
    Json(request): Json<ReorderRequest>,
) -> RadiocastResult<Response> {
    state.playlist.reorder(&request.order)?;
    Ok(api_ok())
}

/// Rescans the media directory.
async fn reload_playlist(State(state): State<AppState>) -> RadiocastResult<Response> {
    state.playlist.reload()?;
    Ok(api_ok())
}

/// Ends the current track early at the next frame boundary.
async fn skip_track(State(state): State<AppState>) -> Response {
    state.engine.skip();
    api_ok()
}
