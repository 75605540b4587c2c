//! HTTP routes.

pub mod evolution;
pub mod health;

use axum::routing::post;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full API router with request tracing.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new().route("/evolution/run", post(evolution::run_evolution));

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health::create_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
