use std::sync::Arc;

use axum::Router;

use crate::AppState;

pub mod actions;
pub mod health;
pub mod jails;
pub mod log;
pub mod mode;
pub mod status;

/// All `/api` routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(status::router())
        .merge(jails::router())
        .merge(actions::router())
        .merge(log::router())
        .merge(mode::router())
        .merge(health::router())
}
