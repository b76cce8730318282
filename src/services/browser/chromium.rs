//! Chromium-backed browser driver.

use std::path::Path;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::models::DownloadConfig;
use crate::services::browser::BrowserDriver;

/// A launched Chromium process with one page.
///
/// The process is released by `shutdown`, or killed when the driver is
/// dropped without it.
pub struct ChromiumDriver {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumDriver {
    /// Launch Chromium with downloads routed into `download_dir`.
    pub async fn launch(config: &DownloadConfig, download_dir: &Path) -> Result<Self> {
        let mut builder = BrowserConfig::builder();
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &config.browser_executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder.build().map_err(AppError::browser)?;

        let (browser, mut events) = Browser::launch(browser_config)
            .await
            .map_err(AppError::browser)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let download_path = std::path::absolute(download_dir)?;
        let behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_path.to_string_lossy().into_owned())
            .build()
            .map_err(AppError::browser)?;
        browser.execute(behavior).await.map_err(AppError::browser)?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(AppError::browser)?;

        log::info!("Browser launched, downloads go to {}", download_path.display());
        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler,
        })
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page.goto(url).await.map_err(AppError::browser)?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.page
            .url()
            .await
            .map_err(AppError::browser)?
            .ok_or_else(|| AppError::browser("page has no URL"))
    }

    async fn page_source(&self) -> Result<String> {
        self.page.content().await.map_err(AppError::browser)
    }

    async fn trigger_download(&self, url: &str) -> Result<()> {
        let script = format!("window.location.href = {};", serde_json::to_string(url)?);
        self.page.evaluate(script).await.map_err(AppError::browser)?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };
        if let Err(e) = browser.close().await {
            log::warn!("Browser did not close cleanly: {}", e);
        }
        let _ = browser.wait().await;
        self.handler.abort();
        log::debug!("Browser closed");
        Ok(())
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        self.handler.abort();
        if self.browser.get_mut().take().is_some() {
            // Dropping the Browser kills its child process
            log::debug!("Browser released without shutdown");
        }
    }
}
