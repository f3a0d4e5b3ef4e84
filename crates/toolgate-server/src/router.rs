use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::app_state::AppState;
use crate::handlers;

/// Create the main application router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // SSE transport: event stream plus the side channel it announces
        .route("/sse", get(handlers::mcp_sse))
        .route("/messages", post(handlers::mcp_message))
        // Plain request/response for clients that don't hold a stream
        .route("/mcp", post(handlers::mcp_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
