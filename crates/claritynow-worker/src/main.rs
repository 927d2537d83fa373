//! ClarityNow Worker
//!
//! Pulls tasks from the Redis queue and runs them until interrupted.

use anyhow::{Context, Result};
use claritynow_common::{RedisQueue, TaskQueue};
use claritynow_platform::{GatewayPlatform, Platform, SimulatedPlatform};
use claritynow_worker::{start_workers, ClarityNow, Config, ImageCatalog};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claritynow_worker=debug,claritynow_platform=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Starting ClarityNow Worker");
    info!("Redis URL: {}", config.redis_url);
    info!("Image directory: {}", config.images_dir.display());

    if !config.images_dir.is_dir() {
        warn!(
            "Image directory does not exist: {}",
            config.images_dir.display()
        );
    }

    // One connection per worker: a blocking pop holds its connection
    let worker_config = config.worker_config();
    let mut queues: Vec<Arc<dyn TaskQueue>> = Vec::with_capacity(worker_config.num_workers);
    for _ in 0..worker_config.num_workers {
        let queue = RedisQueue::new(&config.redis_url, config.result_ttl_secs)
            .await
            .context("Failed to initialize task queue")?;
        queues.push(Arc::new(queue));
    }

    let platform: Arc<dyn Platform> = match &config.platform_url {
        Some(url) if !config.mock_mode => {
            info!("Platform gateway: {}", url);
            Arc::new(
                GatewayPlatform::new(
                    url,
                    config.platform_user.clone(),
                    config.platform_password.clone(),
                )
                .context("Failed to configure platform gateway")?,
            )
        }
        _ => {
            info!("Using simulated platform (MOCK_MODE=true)");
            let simulated = SimulatedPlatform::new();
            for user in &config.mock_users {
                simulated.add_folder(user);
            }
            for network in &config.mock_networks {
                simulated.add_network(network);
            }
            Arc::new(simulated)
        }
    };

    let app = Arc::new(ClarityNow::new(
        platform,
        ImageCatalog::new(config.images_dir.clone()),
        config.ip_wait(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = start_workers(&worker_config, queues, app, shutdown_rx);
    info!("{} workers started, processing jobs...", handles.len());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested, waiting for running jobs to finish");
    shutdown_tx.send(true).ok();

    for handle in handles {
        handle.await?;
    }

    info!("ClarityNow Worker stopped");
    Ok(())
}
