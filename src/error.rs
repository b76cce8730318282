// src/error.rs

//! Unified error handling for the crawler application.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or request failed outside a fetch context
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

    /// Regex compilation failed
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Listing request or parse failed (transient)
    #[error("Fetch error for {context}: {message}")]
    Fetch { context: String, message: String },

    /// The site redirected to a login surface
    #[error("Authentication required: redirected to {url}")]
    AuthRequired { url: String },

    /// A single item failed to download
    #[error("Download failed for item {identity}: {message}")]
    Download { identity: String, message: String },

    /// The download was triggered but the output file never stabilized
    #[error("Download of item {identity} did not complete within {waited:?}")]
    VerificationTimeout { identity: String, waited: Duration },

    /// Browser driver failure
    #[error("Browser error: {0}")]
    Browser(String),

    /// The crawl ended without usable data
    #[error("Crawl aborted: {0}")]
    Aborted(String),
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

    /// Create a fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an authentication error.
    pub fn auth_required(url: impl Into<String>) -> Self {
        Self::AuthRequired { url: url.into() }
    }

    /// Create a per-item download error.
    pub fn download(identity: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Download {
            identity: identity.into(),
            message: message.to_string(),
        }
    }

    /// Create a browser driver error.
    pub fn browser(message: impl fmt::Display) -> Self {
        Self::Browser(message.to_string())
    }

    /// Whether this error ends the whole run rather than one page or item.
    pub fn is_auth_required(&self) -> bool {
        matches!(self, Self::AuthRequired { .. })
    }
}
