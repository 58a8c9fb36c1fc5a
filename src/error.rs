// src/error.rs

//! Unified error handling for the stock checker.

use std::fmt;

use thiserror::Error;

/// Result type alias for checker operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed (navigation, timeout, bad status)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// History CSV write failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// SMTP relay rejected the connection, login or message
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// Mail message could not be assembled
    #[error("Mail error: {0}")]
    Mail(String),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Login flow failed
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A human has to supply input that is not available
    #[error("Manual intervention required: {0}")]
    ManualIntervention(String),

    /// Probing a single item failed
    #[error("Probe error for {url}: {message}")]
    Probe { url: String, message: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create a mail assembly error.
    pub fn mail(message: impl fmt::Display) -> Self {
        Self::Mail(message.to_string())
    }

    /// Create a probe error with the failing URL.
    pub fn probe(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Probe {
            url: url.into(),
            message: message.to_string(),
        }
    }
}
