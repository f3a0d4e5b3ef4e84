use axum::{extract::State, Json};
use serde_json::Value;

use crate::app_state::AppState;

/// Health check endpoint, with a summary of what is being served.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": state.publisher.server_name(),
        "tools": state.publisher.descriptors().len(),
        "sessions": state.sessions.len().await,
    }))
}
