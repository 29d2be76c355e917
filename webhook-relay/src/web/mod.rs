//! HTTP surface of the relay.
//!
//! - `GET /` serves an info banner
//! - `POST /webhook` verifies, logs and optionally forwards a delivery
//! - anything else is rejected and logged to the error stream

pub mod handlers;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{index, method_not_allowed, not_found, webhook, AppState, WEBHOOK_PATH};
pub use signature::{compute_signature, verify_signature, SIGNATURE_HEADER};

/// Build the router for the relay.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index).fallback(method_not_allowed))
        .route(WEBHOOK_PATH, post(webhook).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
