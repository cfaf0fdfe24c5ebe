//! Web server module for the intake endpoint.
//!
//! This module provides a thin, fast web server that:
//! - Accepts `tel` and `msg` query parameters on one configurable route
//! - Tags the request with a trace token
//! - Hands the envelope to a bounded background dispatcher
//! - Returns without waiting for Redis

pub mod dispatch;
pub mod handlers;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use dispatch::{Dispatched, Enqueuer, EnqueuerTasks, SaturationPolicy};
pub use handlers::{health, notify, AppState, HealthResponse, NotifyParams};

/// Build the intake router.
pub fn router(state: AppState) -> Router {
    let route = state.config.handler_uri.clone();
    let mut app = Router::new();
    if route != "/health" {
        app = app.route("/health", get(health));
    }
    app.route(&route, get(notify).post(notify))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
