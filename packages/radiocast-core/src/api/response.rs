//! Shared helpers for REST responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// 200 OK with a JSON body.
pub fn api_success(body: Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

/// 200 OK acknowledging an action with no payload.
pub fn api_ok() -> Response {
    api_success(json!({ "ok": true }))
}
