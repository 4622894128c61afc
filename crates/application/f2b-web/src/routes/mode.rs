use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/mode", get(api_mode))
}

async fn api_mode(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "mode": state.mode,
        "demo": state.is_demo(),
    }))
}
