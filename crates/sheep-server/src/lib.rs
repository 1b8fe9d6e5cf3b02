//! # Sheep Server
//!
//! HTTP recall service over the cognitive memory engine. Endpoints:
//!
//! - `POST /memories` — append a chat message to the session buffer
//! - `POST /consolidate` — run the sleep pipeline over buffered sessions
//! - `GET /recall` — answer a question (always 200, degraded on failure)
//! - `GET /health` — service and mode report

pub mod api;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the service router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/memories", post(api::add_memory))
        .route("/consolidate", post(api::consolidate))
        .route("/recall", get(api::recall))
        .route("/health", get(api::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
