//! Browser-automation capability.
//!
//! Login-gated listings and exports are reached through a real browser
//! session. The driver is an explicitly owned handle: whoever launches it
//! passes it to the components that need it and calls `shutdown` when the
//! run ends.

#[cfg(feature = "browser")]
mod chromium;

#[cfg(feature = "browser")]
pub use chromium::ChromiumDriver;

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, GroupRef, ListingPage};
use crate::services::listing::{Fetcher, ListingParser};

/// What the crawl needs from a browser.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate and wait for the page to load.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// URL of the current page after redirects.
    async fn current_url(&self) -> Result<String>;

    /// Rendered DOM of the current page.
    async fn page_source(&self) -> Result<String>;

    /// Start a file download by visiting `url`, without waiting for a page.
    async fn trigger_download(&self, url: &str) -> Result<()>;

    /// Release the browser process.
    async fn shutdown(&self) -> Result<()>;
}

/// Reads listing pages from the rendered DOM.
pub struct BrowserListingFetcher {
    driver: Arc<dyn BrowserDriver>,
    config: Arc<Config>,
    collection: String,
    parser: ListingParser,
}

impl BrowserListingFetcher {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        config: Arc<Config>,
        collection: impl Into<String>,
    ) -> Result<Self> {
        let parser = ListingParser::new(&config)?;
        Ok(Self {
            driver,
            config,
            collection: collection.into(),
            parser,
        })
    }

    async fn fetch_listing(&self, url: &str, context: &str) -> Result<ListingPage> {
        log::debug!("Browsing {}: {}", context, url);
        self.driver
            .navigate(url)
            .await
            .map_err(|e| AppError::fetch(context, e))?;

        let current = self
            .driver
            .current_url()
            .await
            .map_err(|e| AppError::fetch(context, e))?;
        let current = Url::parse(&current).map_err(|e| AppError::fetch(context, e))?;
        if current.as_str() != url && self.config.auth.is_login_url(current.path()) {
            return Err(AppError::auth_required(current.as_str()));
        }

        let html = self
            .driver
            .page_source()
            .await
            .map_err(|e| AppError::fetch(context, e))?;

        self.parser.parse(&html, &current).map_err(|e| match e {
            AppError::AuthRequired { .. } => e,
            other => AppError::fetch(context, other),
        })
    }
}

#[async_trait]
impl Fetcher for BrowserListingFetcher {
    async fn fetch(&self, page: u32) -> Result<ListingPage> {
        let url = self.config.site.listing_url_for(
            &self.collection,
            page,
            self.config.crawler.page_size,
        );
        self.fetch_listing(&url, &format!("page {page}")).await
    }

    async fn fetch_group(&self, group: &GroupRef) -> Result<ListingPage> {
        let url = self
            .config
            .site
            .group_url_for(&self.collection, &group.identity);
        self.fetch_listing(&url, &format!("group '{}'", group.title))
            .await
    }
}
