// =====================================================================================
// File: service-scoring/src/lib.rs
// Description: HTTP adapter for the risk-scoring pipeline: application state and
//              router assembly
// =====================================================================================

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use core_scoring::Pipeline;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/cases/score", post(handlers::score_case))
        .route(
            "/config/weights",
            get(handlers::get_weights).patch(handlers::update_weights),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
