use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use f2b_core::StatusSnapshot;

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/status", get(api_status))
}

async fn api_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusSnapshot>, ApiError> {
    Ok(Json(state.status().await?))
}
