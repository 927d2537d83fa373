//! ClarityNow REST API
//!
//! Authenticates callers and queues ClarityNow appliance operations for the
//! worker pool. Operations answer `202 Accepted` with a task id and a `Link`
//! to the task status route.
//!
//! ## Endpoints
//!
//! - `GET /api/2/inf/claritynow` - List the caller's instances
//! - `POST /api/2/inf/claritynow` - Create an instance
//! - `DELETE /api/2/inf/claritynow` - Delete an instance
//! - `GET /api/2/inf/claritynow/image` - List deployable image versions
//! - `PUT /api/2/inf/claritynow/network` - Move an instance to another network
//! - `GET /api/2/inf/claritynow/task/{id}` - Task status and result
//! - `GET /health` - Health check

pub mod auth;
pub mod config;
pub mod handlers;

use auth::TokenVerifier;
use axum::{
    routing::{get, put},
    Router,
};
use claritynow_common::TaskQueue;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Route prefix of every ClarityNow operation
pub const BASE_PATH: &str = "/api/2/inf/claritynow";

/// Application state shared across handlers
pub struct AppState {
    /// Queue the workers consume
    pub queue: Arc<dyn TaskQueue>,

    /// Verifies `X-Auth` tokens
    pub verifier: TokenVerifier,

    /// Public base URL used in `Link` headers
    pub vlab_url: String,
}

impl AppState {
    /// Create new application state
    pub fn new(queue: Arc<dyn TaskQueue>, verifier: TokenVerifier, vlab_url: String) -> Self {
        Self {
            queue,
            verifier,
            vlab_url,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_handler))
        // Instance operations
        .route(
            BASE_PATH,
            get(handlers::show_handler)
                .post(handlers::create_handler)
                .delete(handlers::delete_handler),
        )
        .route(
            &format!("{}/image", BASE_PATH),
            get(handlers::image_handler),
        )
        .route(
            &format!("{}/network", BASE_PATH),
            put(handlers::modify_network_handler),
        )
        // Task status
        .route(
            &format!("{}/task/{{task_id}}", BASE_PATH),
            get(handlers::task_status_handler),
        )
        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
