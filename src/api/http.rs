//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{get_key, list_keys, put_key};
use crate::context::AppContext;

/// Create the Axum router with all endpoints
pub fn create_router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check; shadows a key literally named "health"
        .route("/health", get(health_check))
        .route("/", get(list_keys).post(put_key))
        .route("/:key", get(get_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
