//! ClarityNow API Service
//!
//! REST API that queues ClarityNow appliance operations for the workers.

use anyhow::{Context, Result};
use claritynow_api::{auth::TokenVerifier, config::Config, create_router, AppState, BASE_PATH};
use claritynow_common::{RedisQueue, TaskQueue};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claritynow_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ClarityNow API Service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Configuration loaded - listening on {}",
        config.api_address()
    );

    let queue: Arc<dyn TaskQueue> = Arc::new(
        RedisQueue::new(&config.redis_url, config.result_ttl_secs)
            .await
            .context("Failed to initialize task queue")?,
    );
    let verifier = TokenVerifier::new(config.auth_token_secret.as_bytes());

    // Create application state
    let state = AppState::new(queue, verifier, config.vlab_url.clone());
    let app = create_router(state);

    // Start server
    let listener = TcpListener::bind(&config.api_address())
        .await
        .with_context(|| format!("Failed to bind to {}", config.api_address()))?;

    info!("ClarityNow API listening on {}", config.api_address());
    info!("Health check: http://{}/health", config.api_address());
    info!("API endpoints:");
    info!("  GET    {} - List instances", BASE_PATH);
    info!("  POST   {} - Create instance", BASE_PATH);
    info!("  DELETE {} - Delete instance", BASE_PATH);
    info!("  GET    {}/image - List images", BASE_PATH);
    info!("  PUT    {}/network - Change instance network", BASE_PATH);
    info!("  GET    {}/task/{{id}} - Task status", BASE_PATH);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
