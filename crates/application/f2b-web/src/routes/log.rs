use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use f2b_actionlog::LogQuery;
use f2b_core::{validate_jail_name, ActionKind, ActionLogEntry};
use serde::Deserialize;

use crate::error::ApiError;
use crate::service::{DEFAULT_LOG_LIMIT, MAX_LOG_LIMIT};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/log", get(api_log))
}

/// Raw query string values; parsed by hand so bad input gets the usual
/// `{error, kind}` body.
#[derive(Debug, Default, Deserialize)]
pub struct LogParams {
    since: Option<String>,
    limit: Option<String>,
    jail: Option<String>,
    action: Option<String>,
}

impl LogParams {
    pub fn into_query(self) -> Result<LogQuery, ApiError> {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        let since = present(self.since)
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw.trim())
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| ApiError::Validation(format!("Invalid since '{raw}': {e}")))
            })
            .transpose()?;

        let limit = match present(self.limit) {
            None => DEFAULT_LOG_LIMIT,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if (1..=MAX_LOG_LIMIT).contains(&n) => n,
                _ => {
                    return Err(ApiError::Validation(format!(
                        "Invalid limit '{raw}': expected 1 to {MAX_LOG_LIMIT}"
                    )))
                }
            },
        };

        let jail = present(self.jail)
            .map(|raw| validate_jail_name(raw.trim()).map(String::from))
            .transpose()?;

        let action = present(self.action)
            .map(|raw| raw.parse::<ActionKind>().map_err(ApiError::Validation))
            .transpose()?;

        Ok(LogQuery {
            since,
            limit: Some(limit),
            jail,
            action,
        })
    }
}

async fn api_log(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogParams>,
) -> Result<Json<Vec<ActionLogEntry>>, ApiError> {
    let query = params.into_query()?;
    Ok(Json(state.action_log(&query).await?))
}
