//! Direct HTTP export.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};

use crate::error::{AppError, Result};
use crate::models::{Config, ItemRef};
use crate::services::download::DownloadStrategy;
use crate::storage::OutputDirectory;
use crate::utils::filename::canonical_file_name;

/// Streams the export endpoint straight into the output directory.
pub struct DirectExportDownloader {
    client: Client,
    config: Arc<Config>,
}

impl DirectExportDownloader {
    pub fn new(client: Client, config: Arc<Config>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl DownloadStrategy for DirectExportDownloader {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn download(&self, item: &ItemRef, output: &OutputDirectory) -> Result<PathBuf> {
        let url = self.config.site.export_url_for(&item.identity);
        log::debug!("Exporting {} from {}", item.identity, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::download(&item.identity, e))?;

        let final_url = response.url().clone();
        if final_url.as_str() != url && self.config.auth.is_login_url(final_url.path()) {
            return Err(AppError::auth_required(final_url.as_str()));
        }
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AppError::auth_required(final_url.as_str()));
        }

        let response = response
            .error_for_status()
            .map_err(|e| AppError::download(&item.identity, e))?;

        // An HTML body here is an error or login page, not an export
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().starts_with("text/html"));
        if is_html {
            return Err(AppError::download(
                &item.identity,
                format!("expected an export file but got an HTML page from {final_url}"),
            ));
        }

        let name = canonical_file_name(
            &item.identity,
            &item.label,
            output.extension(),
            self.config.matching.max_label_len,
        );
        output
            .write_stream(&name, Box::pin(response.bytes_stream()))
            .await
    }
}
