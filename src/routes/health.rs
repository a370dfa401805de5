use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let body = json!({
        "status": "ok",
        "active_conversations": state.dispatcher.active_workers(),
    });
    (StatusCode::OK, Json(body))
}
