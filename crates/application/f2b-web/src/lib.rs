//! fail2ban dashboard API
//!
//! JSON over HTTP for a browser front-end:
//!
//! - `GET  /api/status`                  totals, jails, 24h timeline, top offenders
//! - `GET  /api/jail/{name}`             one jail
//! - `POST /api/jail/{name}/ban/{ip}`    ban through the daemon, logged
//! - `POST /api/jail/{name}/unban/{ip}`  unban through the daemon, logged
//! - `GET  /api/log`                     action log (`since`, `limit`, `jail`, `action`)
//! - `GET  /api/mode`                    live or demo
//! - `GET  /api/health`                  liveness and daemon reachability
//!
//! The mode is decided once at startup (see [`resolve_mode`]). In demo mode
//! every read is synthetic and actions are acknowledged without touching
//! anything.

pub mod error;
pub mod routes;
pub mod service;
pub mod state;

use std::sync::Arc;

use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use service::ActionOutcome;
pub use state::{resolve_mode, AppState};

/// Create the main router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut app = Router::new().merge(routes::router());

    if let Some(dir) = &state.config.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Start the web server on the configured address.
pub async fn serve(state: Arc<AppState>) -> std::io::Result<()> {
    let addr = state.config.listen_addr();
    let mode = state.mode;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%mode, "f2b-dashboard listening on http://{}", addr);

    axum::serve(listener, app).await
}
