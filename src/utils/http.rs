// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderValue};

use crate::error::{AppError, Result};
use crate::models::Config;

/// Create a configured asynchronous HTTP client.
///
/// Carries the configured session cookie, if any, on every request.
pub fn create_async_client(config: &Config) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = &config.auth.cookie {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| AppError::config(format!("auth.cookie is not a valid header: {e}")))?;
        headers.insert(COOKIE, value);
    }

    let client = reqwest::Client::builder()
        .user_agent(&config.crawler.user_agent)
        .timeout(Duration::from_secs(config.crawler.timeout_secs))
        .default_headers(headers)
        .build()?;
    Ok(client)
}
