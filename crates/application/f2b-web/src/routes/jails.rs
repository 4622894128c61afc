use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use f2b_core::Jail;

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/jail/:name", get(api_jail))
}

async fn api_jail(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Jail>, ApiError> {
    Ok(Json(state.jail(&name).await?))
}
