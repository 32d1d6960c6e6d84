// src/error.rs

//! Unified error handling for the relay.

use std::fmt;

use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The post API answered with something unusable
    #[error("Upstream error for {feed}: {message}")]
    Upstream { feed: String, message: String },

    /// A webhook delivery gave up after exhausting its retries
    #[error("Delivery to {feed} failed after {attempts} attempt(s): {message}")]
    Delivery {
        feed: String,
        attempts: u32,
        message: String,
    },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an upstream error for a feed.
    pub fn upstream(feed: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Upstream {
            feed: feed.into(),
            message: message.to_string(),
        }
    }

    /// Create a delivery error for a feed.
    pub fn delivery(feed: impl Into<String>, attempts: u32, message: impl fmt::Display) -> Self {
        Self::Delivery {
            feed: feed.into(),
            attempts,
            message: message.to_string(),
        }
    }
}
