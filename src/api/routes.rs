//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    add_handler, clear_handler, delete_handler, get_handler, get_many_handler, has_key_handler,
    health_handler, set_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /set` - Store a value, replacing any existing one
/// - `PUT /add` - Store a value unless a live identical one exists
/// - `GET /get/:key` - Retrieve a value by key
/// - `POST /get_many` - Retrieve several values at once
/// - `DELETE /del/:key` - Delete a key and its chunks
/// - `GET /has/:key` - Check whether a live entry exists
/// - `DELETE /clear` - Remove every entry
/// - `GET /stats` - Get cache statistics
/// - `GET /health` - Health check endpoint
///
/// Key-addressed GET and DELETE routes accept an optional `?version=` query.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/set", put(set_handler))
        .route("/add", put(add_handler))
        .route("/get/:key", get(get_handler))
        .route("/get_many", post(get_many_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/has/:key", get(has_key_handler))
        .route("/clear", delete(clear_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
