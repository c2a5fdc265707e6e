//! Configuration management for the load engine
//!
//! This module handles defaults, validation, and environment overrides for
//! engine configuration.

use serde::{Deserialize, Serialize};

use crate::utils::error::{LoadError, Result};

/// Main configuration struct for the load engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Remote API connection settings
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Load orchestration settings
    #[serde(default)]
    pub load: LoadConfig,
}

/// Remote API connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote system of record
    pub base_url: String,
    /// Request timeout in seconds
    pub request_timeout: u64,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3333/api".to_string(),
            request_timeout: 120,
            connect_timeout: 10,
        }
    }
}

/// Load orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Default number of records per batch when the caller does not choose one
    pub default_batch_size: usize,
    /// Delay between job status fetches, in milliseconds
    pub poll_interval_ms: u64,
    /// Maximum number of status fetches before the poller gives up
    pub max_poll_iterations: u32,
    /// Concurrent related-record lookups during preparation
    pub lookup_concurrency: usize,
    /// Byte-size threshold that closes an attachment batch (base64-encoded size)
    pub attachment_size_threshold: usize,
    /// Record-count threshold that closes an attachment batch
    pub attachment_record_threshold: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            default_batch_size: 10_000,
            poll_interval_ms: 3_000,
            max_poll_iterations: 200,
            lookup_concurrency: 3,
            attachment_size_threshold: 5 * 1024 * 1024,
            attachment_record_threshold: 200,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Recognized variables: `BULKFLOW_BASE_URL`, `BULKFLOW_POLL_INTERVAL_MS`,
    /// `BULKFLOW_MAX_POLL_ITERATIONS`, `BULKFLOW_BATCH_SIZE`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var("BULKFLOW_BASE_URL") {
            config.remote.base_url = base_url;
        }
        if let Ok(interval) = std::env::var("BULKFLOW_POLL_INTERVAL_MS") {
            config.load.poll_interval_ms = interval
                .parse()
                .map_err(|e| LoadError::Config(format!("Invalid BULKFLOW_POLL_INTERVAL_MS: {}", e)))?;
        }
        if let Ok(iterations) = std::env::var("BULKFLOW_MAX_POLL_ITERATIONS") {
            config.load.max_poll_iterations = iterations.parse().map_err(|e| {
                LoadError::Config(format!("Invalid BULKFLOW_MAX_POLL_ITERATIONS: {}", e))
            })?;
        }
        if let Ok(batch_size) = std::env::var("BULKFLOW_BATCH_SIZE") {
            config.load.default_batch_size = batch_size
                .parse()
                .map_err(|e| LoadError::Config(format!("Invalid BULKFLOW_BATCH_SIZE: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.remote.base_url.is_empty() {
            return Err(LoadError::Config("base_url must not be empty".to_string()));
        }
        if self.load.default_batch_size == 0 {
            return Err(LoadError::Config(
                "default_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.load.poll_interval_ms == 0 {
            return Err(LoadError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.load.lookup_concurrency == 0 {
            return Err(LoadError::Config(
                "lookup_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.load.attachment_record_threshold == 0 {
            return Err(LoadError::Config(
                "attachment_record_threshold must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
