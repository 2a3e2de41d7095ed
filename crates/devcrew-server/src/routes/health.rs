use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::AppState;

/// Liveness probe: reports healthy once the state directory is writable.
/// Mirrors the original's shallow health check — no dependency pings,
/// just "is this process able to do its job".
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match tokio::fs::create_dir_all(&state.data_root).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "healthy": true, "data_root": state.data_root.display().to_string() })),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "healthy": false, "error": err.to_string() })),
        ),
    }
}
