//! Browser-driven export.
//!
//! The browser saves the export into the output directory on its own. We
//! only see the directory, so completion is judged by watching for a new
//! non-partial file whose size holds steady across two polls.
//!
//! An export that misses its wait window may still land later. Such items
//! are remembered, and while any are outstanding a new file is only taken
//! when its name matches the current item.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, ItemRef};
use crate::services::browser::BrowserDriver;
use crate::services::dedup::{Deduplicator, OutputIndex};
use crate::services::download::DownloadStrategy;
use crate::storage::{OutputDirectory, is_partial};

/// Triggers exports in a browser session and waits for the file to land.
pub struct BrowserExportDownloader {
    driver: Arc<dyn BrowserDriver>,
    config: Arc<Config>,
    dedup: Deduplicator,
    wait_timeout: Duration,
    poll_interval: Duration,
    late: Mutex<LateExports>,
}

/// Timed-out items whose export may still arrive, and the files they
/// turned out to own.
#[derive(Debug, Default)]
struct LateExports {
    pending: Vec<ItemRef>,
    claimed: HashSet<PathBuf>,
}

impl BrowserExportDownloader {
    pub fn new(driver: Arc<dyn BrowserDriver>, config: Arc<Config>) -> Self {
        let wait_timeout = Duration::from_secs(config.download.wait_timeout_secs);
        let poll_interval = Duration::from_millis(config.download.poll_interval_ms);
        Self {
            driver,
            dedup: Deduplicator::new(&config.matching),
            config,
            wait_timeout,
            poll_interval,
            late: Mutex::new(LateExports::default()),
        }
    }

    /// Override the completion wait, mostly for tests.
    pub fn with_timing(mut self, wait_timeout: Duration, poll_interval: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self.poll_interval = poll_interval;
        self
    }

    async fn check_login(&self) -> Result<()> {
        match self.driver.current_url().await {
            Ok(current) => {
                let path = Url::parse(&current)
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|_| current.clone());
                if self.config.auth.is_login_url(&path) {
                    return Err(AppError::auth_required(current));
                }
            }
            Err(e) => log::debug!("Could not read browser URL: {}", e),
        }
        Ok(())
    }

    /// Completed file that was not present before the trigger and belongs
    /// to `item`.
    fn new_completed_file(
        &self,
        item: &ItemRef,
        output: &OutputDirectory,
        before: &HashMap<PathBuf, u64>,
        now: HashMap<PathBuf, u64>,
    ) -> Option<(PathBuf, u64)> {
        let mut fresh: Vec<(PathBuf, u64)> = now
            .into_iter()
            .filter(|(path, size)| {
                *size > 0
                    && !before.contains_key(path)
                    && !is_partial(path)
                    && output.has_output_extension(path)
            })
            .collect();
        fresh.sort();

        let late_pending = self.set_aside_late_exports(&mut fresh);

        let index = OutputIndex::from_paths(fresh.iter().map(|(path, _)| path.clone()));
        let own = self.dedup.exists_on_disk(&item.identity, &item.label, &index);
        if let Some(path) = own.path() {
            return fresh.into_iter().find(|(p, _)| p == path);
        }
        if late_pending {
            return None;
        }
        fresh.into_iter().next()
    }

    /// Drop files that belong to timed-out items from `fresh`.
    ///
    /// Returns whether any timed-out item is still outstanding.
    fn set_aside_late_exports(&self, fresh: &mut Vec<(PathBuf, u64)>) -> bool {
        let Ok(mut late) = self.late.lock() else {
            return false;
        };
        let LateExports { pending, claimed } = &mut *late;

        pending.retain(|item| {
            let index = OutputIndex::from_paths(
                fresh
                    .iter()
                    .map(|(path, _)| path.clone())
                    .filter(|path| !claimed.contains(path)),
            );
            let found = self.dedup.exists_on_disk(&item.identity, &item.label, &index);
            let Some(path) = found.path() else {
                return true;
            };
            log::warn!(
                "Late export of '{}' ({}) arrived as {}",
                item.label,
                item.identity,
                path.display()
            );
            claimed.insert(path.to_path_buf());
            false
        });

        fresh.retain(|(path, _)| !claimed.contains(path));
        !pending.is_empty()
    }

    fn remember_late(&self, item: &ItemRef) {
        if let Ok(mut late) = self.late.lock() {
            late.pending.push(item.clone());
        }
    }

    async fn wait_for_file(
        &self,
        item: &ItemRef,
        output: &OutputDirectory,
        before: &HashMap<PathBuf, u64>,
    ) -> Result<PathBuf> {
        let started = Instant::now();
        let deadline = started + self.wait_timeout;
        let mut candidate: Option<(PathBuf, u64)> = None;

        loop {
            tokio::time::sleep(self.poll_interval).await;
            self.check_login().await?;

            let now = output.snapshot().await?;
            let sample = self.new_completed_file(item, output, before, now);
            match (&candidate, &sample) {
                (Some(previous), Some(current)) if previous == current => {
                    log::debug!(
                        "Export of {} settled at {} bytes after {:?}",
                        item.identity,
                        current.1,
                        started.elapsed()
                    );
                    return Ok(current.0.clone());
                }
                _ => candidate = sample,
            }

            if Instant::now() >= deadline {
                self.remember_late(item);
                return Err(AppError::VerificationTimeout {
                    identity: item.identity.clone(),
                    waited: self.wait_timeout,
                });
            }
        }
    }
}

#[async_trait]
impl DownloadStrategy for BrowserExportDownloader {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn download(&self, item: &ItemRef, output: &OutputDirectory) -> Result<PathBuf> {
        output.ensure_exists().await?;
        let before = output.snapshot().await?;

        let url = self.config.site.export_url_for(&item.identity);
        log::debug!("Triggering export of {} at {}", item.identity, url);
        self.driver
            .trigger_download(&url)
            .await
            .map_err(|e| match e {
                AppError::AuthRequired { .. } => e,
                other => AppError::download(&item.identity, other),
            })?;

        self.wait_for_file(item, output, &before).await
    }

    async fn shutdown(&self) -> Result<()> {
        self.driver.shutdown().await
    }
}
