//! Web server module exposing the dispatch endpoints.
//!
//! Routes:
//! - `GET /health`
//! - `POST /newsletter/send`: run a cycle now and report counts
//! - `GET /newsletter/status`: describe the periodic trigger

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, scheduler_status, send_now, AppState, ErrorResponse, HealthResponse, SendResponse,
};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/newsletter/send", post(send_now))
        .route("/newsletter/status", get(scheduler_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
