//! Error handling for the load engine
//!
//! This module defines all error types used throughout the engine.

use thiserror::Error;

/// Result type alias for the load engine
pub type Result<T> = std::result::Result<T, LoadError>;

/// Main error type for the load engine
#[derive(Error, Debug)]
pub enum LoadError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV encoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Row preparation failed for every input row
    #[error("Preparation failed: {0}")]
    Prepare(String),

    /// Remote API rejected a request
    #[error("Remote API error: {0}")]
    RemoteApi(String),

    /// One or more batches failed to reach the remote system
    #[error("{message}")]
    BatchLoad {
        /// Aggregate description of the failure
        message: String,
        /// Per-batch submission errors, in submission order
        batch_errors: Vec<String>,
    },

    /// Session channel errors
    #[error("Session channel error: {0}")]
    Channel(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LoadError {
    /// Build the aggregate error raised when at least one batch submission failed.
    pub fn batch_load(batch_errors: Vec<String>) -> Self {
        Self::BatchLoad {
            message: "One or more batches failed to load".to_string(),
            batch_errors,
        }
    }

    /// Whether the error ends the session immediately rather than accumulating
    /// into the final tallies.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::BatchLoad { .. })
    }
}
