use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use f2b_core::ActionKind;

use crate::error::ApiError;
use crate::service::ActionOutcome;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/jail/:name/ban/:ip", post(api_ban))
        .route("/api/jail/:name/unban/:ip", post(api_unban))
}

async fn api_ban(
    State(state): State<Arc<AppState>>,
    Path((name, ip)): Path<(String, String)>,
) -> Result<(StatusCode, Json<ActionOutcome>), ApiError> {
    dispatch(&state, ActionKind::Ban, &name, &ip).await
}

async fn api_unban(
    State(state): State<Arc<AppState>>,
    Path((name, ip)): Path<(String, String)>,
) -> Result<(StatusCode, Json<ActionOutcome>), ApiError> {
    dispatch(&state, ActionKind::Unban, &name, &ip).await
}

/// 200 when the daemon accepted the command, 502 when it did not.
async fn dispatch(
    state: &Arc<AppState>,
    action: ActionKind,
    name: &str,
    ip: &str,
) -> Result<(StatusCode, Json<ActionOutcome>), ApiError> {
    let outcome = state.apply(action, name, ip).await?;
    let status = if outcome.succeeded() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(outcome)))
}
