use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/health", get(api_health))
}

async fn api_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // demo mode never touches the daemon
    let daemon = !state.is_demo() && state.client.ping().await.is_ok();

    Json(json!({
        "ok": true,
        "mode": state.mode,
        "daemon": daemon,
    }))
}
