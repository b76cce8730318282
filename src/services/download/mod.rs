//! Download execution.
//!
//! The executor walks the crawl result in order, skips anything already in
//! the output directory, hands the rest to a `DownloadStrategy`, and
//! normalizes the produced file name. Per-item failures are recorded and
//! never stop the run; only a lost login does.

mod browser;
mod direct;

pub use browser::BrowserExportDownloader;
pub use direct::DirectExportDownloader;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{
    CrawlResult, DownloadOutcome, DownloadTally, ItemRef, ItemReport, MatchingConfig,
};
use crate::services::dedup::{Deduplicator, OutputIndex};
use crate::storage::OutputDirectory;
use crate::utils::filename::canonical_file_name;
use crate::utils::shutdown::ShutdownSignal;

/// Capability that turns an item into a file in the output directory.
#[async_trait]
pub trait DownloadStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Export one item and return the path of the completed file.
    async fn download(&self, item: &ItemRef, output: &OutputDirectory) -> Result<PathBuf>;

    /// Release any external resource held by the strategy.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// What the executor did with a crawl result.
#[derive(Debug, Default)]
pub struct ExecutionSummary {
    pub items: Vec<ItemReport>,
    pub tally: DownloadTally,
    /// Stopped early by a shutdown request
    pub interrupted: bool,
    /// Stopped early because the site asked for a login
    pub auth_required: Option<String>,
}

/// Runs a download strategy over a crawl result.
pub struct DownloadExecutor<'a> {
    strategy: &'a dyn DownloadStrategy,
    output: &'a OutputDirectory,
    dedup: Deduplicator,
    max_label_len: usize,
    delay: Duration,
    shutdown: ShutdownSignal,
}

impl<'a> DownloadExecutor<'a> {
    pub fn new(
        strategy: &'a dyn DownloadStrategy,
        output: &'a OutputDirectory,
        matching: &MatchingConfig,
        delay: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            strategy,
            output,
            dedup: Deduplicator::new(matching),
            max_label_len: matching.max_label_len,
            delay,
            shutdown,
        }
    }

    /// Process every item in order.
    pub async fn run(&self, items: &CrawlResult) -> ExecutionSummary {
        let mut summary = ExecutionSummary::default();
        let mut index = OutputIndex::default();
        let total = items.len();

        for (i, item) in items.iter().enumerate() {
            if self.shutdown.is_requested() {
                log::warn!("Stopping before item {}/{}", i + 1, total);
                summary.interrupted = true;
                break;
            }

            match OutputIndex::scan(self.output).await {
                Ok(fresh) => index = fresh,
                Err(e) => log::warn!("Could not rescan {}: {}", self.output.root().display(), e),
            }

            log::info!("[{}/{}] {} ({})", i + 1, total, item.label, item.identity);
            let outcome = match self.process(item, &mut index).await {
                Ok(outcome) => outcome,
                Err(AppError::AuthRequired { url }) => {
                    log::error!("Login required while downloading '{}': {}", item.label, url);
                    let outcome = DownloadOutcome::Failed {
                        reason: format!("login required ({url})"),
                    };
                    summary.record(item, outcome);
                    summary.auth_required = Some(url);
                    break;
                }
                Err(e) => {
                    log::warn!("Error downloading '{}' (ID: {}): {}", item.label, item.identity, e);
                    DownloadOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };

            let touched_network = !matches!(outcome, DownloadOutcome::SkippedExisting { .. });
            summary.record(item, outcome);

            if touched_network && i + 1 < total && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        summary
    }

    /// Skip, or download and normalize, a single item.
    async fn process(&self, item: &ItemRef, index: &mut OutputIndex) -> Result<DownloadOutcome> {
        let existing = self.dedup.exists_on_disk(&item.identity, &item.label, index);
        if let (Some(path), Some(kind)) = (existing.path(), existing.kind()) {
            log::info!(
                "Skipping '{}' - already downloaded as {}",
                item.label,
                display_name(path)
            );
            return Ok(DownloadOutcome::SkippedExisting {
                path: path.to_path_buf(),
                kind,
            });
        }

        let produced = self.strategy.download(item, self.output).await?;
        let path = self.normalize(item, produced).await;
        index.insert(path.clone());

        log::info!("Downloaded: '{}' -> {}", item.label, display_name(&path));
        Ok(DownloadOutcome::Downloaded { path })
    }

    /// Rename to the canonical name when it differs; failures keep the file as is.
    async fn normalize(&self, item: &ItemRef, produced: PathBuf) -> PathBuf {
        let canonical = canonical_file_name(
            &item.identity,
            &item.label,
            self.output.extension(),
            self.max_label_len,
        );
        if produced.file_name().and_then(|n| n.to_str()) == Some(canonical.as_str()) {
            return produced;
        }

        match self.output.rename_to(&produced, &canonical).await {
            Ok(path) => path,
            Err(e) => {
                log::warn!(
                    "Could not rename {} to {}: {}",
                    display_name(&produced),
                    canonical,
                    e
                );
                produced
            }
        }
    }
}

impl ExecutionSummary {
    fn record(&mut self, item: &ItemRef, outcome: DownloadOutcome) {
        self.tally.record(&outcome);
        self.items.push(ItemReport {
            identity: item.identity.clone(),
            label: item.label.clone(),
            outcome,
        });
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
