//! Router construction

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::middleware::AuthLayer;
use crate::AppState;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_body_bytes = state.settings.server.max_body_bytes;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/v1/images/edits", post(handlers::edit_images))
        .route("/v1/gate/stats", get(handlers::gate_stats))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(AuthLayer::new(state.verifier.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
