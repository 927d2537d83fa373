//! Configuration management for the ClarityNow API
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Redis connection URL
    pub redis_url: String,

    /// Public base URL used in `Link` headers
    pub vlab_url: String,

    /// Shared secret for verifying `X-Auth` tokens
    pub auth_token_secret: String,

    /// Seconds a finished job's result is kept
    pub result_ttl_secs: u64,
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

        let config = Config {
            api_host: var("API_HOST", "0.0.0.0"),

            api_port: var("API_PORT", "5000")
                .parse()
                .context("Invalid API_PORT")?,

            redis_url: var("REDIS_URL", "redis://127.0.0.1:6379"),

            vlab_url: var("VLAB_URL", "https://localhost")
                .trim_end_matches('/')
                .to_string(),

            auth_token_secret: lookup("AUTH_TOKEN_SECRET").unwrap_or_default(),

            result_ttl_secs: var("RESULT_TTL_SECS", "86400")
                .parse()
                .context("Invalid RESULT_TTL_SECS")?,
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.auth_token_secret.is_empty() {
            anyhow::bail!("AUTH_TOKEN_SECRET must be set");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}
