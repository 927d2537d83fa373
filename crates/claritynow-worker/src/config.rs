//! Configuration management for the ClarityNow worker
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::IpWait;
use crate::worker::WorkerConfig;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL
    pub redis_url: String,

    /// Directory holding `ClarityNow-<version>.ova` images
    pub images_dir: PathBuf,

    /// Number of concurrent workers
    pub num_workers: usize,

    /// Whether to use the simulated platform (for development/testing)
    pub mock_mode: bool,

    /// Networks the simulated platform starts with
    pub mock_networks: Vec<String>,

    /// Namespaces the simulated platform starts with
    pub mock_users: Vec<String>,

    /// Platform gateway URL (when not in mock mode)
    pub platform_url: Option<String>,

    /// Platform service account
    pub platform_user: String,

    /// Platform service account password
    pub platform_password: String,

    /// Seconds between IP address polls while creating an instance
    pub ip_poll_interval_secs: u64,

    /// Seconds to wait for a new instance's IP address
    pub ip_wait_timeout_secs: u64,

    /// Seconds a finished job's result is kept
    pub result_ttl_secs: u64,

    /// Seconds a worker blocks on an empty queue
    pub queue_poll_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let list = |key: &str| {
            lookup(key)
                .map(|value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|item| !item.is_empty())
                        .map(str::to_string)
                        .collect::<Vec<String>>()
                })
                .unwrap_or_default()
        };

        let config = Config {
            redis_url: var("REDIS_URL", "redis://127.0.0.1:6379"),

            images_dir: var("VLAB_CLARITYNOW_IMAGES_DIR", "/images").into(),

            num_workers: var("NUM_WORKERS", "2")
                .parse()
                .context("Invalid NUM_WORKERS")?,

            mock_mode: var("MOCK_MODE", "true")
                .parse()
                .context("Invalid MOCK_MODE (expected true/false)")?,

            mock_networks: list("MOCK_NETWORKS"),
            mock_users: list("MOCK_USERS"),

            platform_url: lookup("INF_VCENTER_SERVER"),
            platform_user: var("INF_VCENTER_USER", "administrator@vsphere.local"),
            platform_password: var("INF_VCENTER_PASSWORD", ""),

            ip_poll_interval_secs: var("IP_POLL_INTERVAL_SECS", "5")
                .parse()
                .context("Invalid IP_POLL_INTERVAL_SECS")?,

            ip_wait_timeout_secs: var("IP_WAIT_TIMEOUT_SECS", "600")
                .parse()
                .context("Invalid IP_WAIT_TIMEOUT_SECS")?,

            result_ttl_secs: var("RESULT_TTL_SECS", "86400")
                .parse()
                .context("Invalid RESULT_TTL_SECS")?,

            queue_poll_secs: var("QUEUE_POLL_SECS", "5")
                .parse()
                .context("Invalid QUEUE_POLL_SECS")?,
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            anyhow::bail!("NUM_WORKERS must be greater than 0");
        }

        if self.queue_poll_secs == 0 {
            anyhow::bail!("QUEUE_POLL_SECS must be greater than 0");
        }

        if self.result_ttl_secs == 0 {
            anyhow::bail!("RESULT_TTL_SECS must be greater than 0");
        }

        // If not in mock mode, require platform gateway configuration
        if !self.mock_mode && self.platform_url.is_none() {
            anyhow::bail!("INF_VCENTER_SERVER is required when MOCK_MODE=false");
        }

        Ok(())
    }

    pub fn ip_wait(&self) -> IpWait {
        IpWait {
            interval: Duration::from_secs(self.ip_poll_interval_secs),
            timeout: Duration::from_secs(self.ip_wait_timeout_secs),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            num_workers: self.num_workers,
            poll_timeout: Duration::from_secs(self.queue_poll_secs),
        }
    }
}
