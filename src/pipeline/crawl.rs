// src/pipeline/crawl.rs

//! Story crawling pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::Result;
use crate::models::{AbortReason, Config, CrawlResult, CrawlState, RunReport, StrategyKind};
use crate::pipeline::paginate::PaginationController;
use crate::services::download::{
    DirectExportDownloader, DownloadExecutor, DownloadStrategy, ExecutionSummary,
};
use crate::services::listing::{Fetcher, HttpListingFetcher};
use crate::storage::OutputDirectory;
use crate::utils::http;
use crate::utils::shutdown::ShutdownSignal;

/// Everything one crawl needs, with the collaborators already built.
pub struct CrawlJob<'a> {
    pub collection: &'a str,
    pub config: &'a Config,
    pub fetcher: &'a dyn Fetcher,
    pub strategy: &'a dyn DownloadStrategy,
    pub output: &'a OutputDirectory,
    pub list_only: bool,
    pub shutdown: ShutdownSignal,
}

/// Crawl one collection, then download the missing items.
///
/// The strategy is always shut down before returning.
pub async fn run_crawl(job: CrawlJob<'_>) -> Result<RunReport> {
    let started_at = Utc::now();
    log::info!(
        "Crawling collection {} with the {} strategy",
        job.collection,
        job.strategy.name()
    );

    let pagination = PaginationController::new(job.fetcher, job.config, job.shutdown.clone())
        .run()
        .await;
    let mut state = pagination.state;
    log::info!(
        "Found {} items in {} pages ({} group fetches)",
        pagination.result.len(),
        pagination.pages_fetched,
        pagination.group_fetches
    );

    let downloads = match &state {
        CrawlState::Aborted(reason) => {
            log::error!("Crawl aborted: {}", reason);
            Ok(ExecutionSummary::default())
        }
        CrawlState::Done(_) if job.list_only => {
            for item in &pagination.result {
                log::info!("  {}  {}", item.identity, item.label);
            }
            Ok(ExecutionSummary::default())
        }
        CrawlState::Done(reason) => {
            log::info!("Crawl finished: {}", reason);
            download_all(&job, &pagination.result).await
        }
    };

    if let Err(e) = job.strategy.shutdown().await {
        log::warn!("Failed to release the {} strategy: {}", job.strategy.name(), e);
    }
    let downloads = downloads?;

    if let Some(url) = downloads.auth_required {
        state = CrawlState::Aborted(AbortReason::AuthRequired { url });
    } else if downloads.interrupted {
        state = CrawlState::Aborted(AbortReason::Interrupted);
    }

    let output_dir = job.output.absolute_root();
    let tally = downloads.tally;
    log::info!(
        "Download complete for collection {}: Successful: {}, Skipped: {}, Failed: {}",
        job.collection,
        tally.successful,
        tally.skipped,
        tally.failed
    );
    log::info!("Files saved to {}", output_dir.display());

    Ok(RunReport {
        collection: job.collection.to_string(),
        state,
        pages_fetched: pagination.pages_fetched,
        group_fetches: pagination.group_fetches,
        discovered: pagination.result.len(),
        tally,
        output_dir,
        started_at,
        finished_at: Utc::now(),
        items: downloads.items,
    })
}

async fn download_all(job: &CrawlJob<'_>, items: &CrawlResult) -> Result<ExecutionSummary> {
    if items.is_empty() {
        return Ok(ExecutionSummary::default());
    }
    job.output.ensure_exists().await?;

    let executor = DownloadExecutor::new(
        job.strategy,
        job.output,
        &job.config.matching,
        Duration::from_millis(job.config.crawler.request_delay_ms),
        job.shutdown.clone(),
    );
    Ok(executor.run(items).await)
}

/// Build the configured fetcher and strategy and crawl one collection.
pub async fn run_crawler(
    config: Arc<Config>,
    collection: &str,
    output_dir: &Path,
    list_only: bool,
    shutdown: ShutdownSignal,
) -> Result<RunReport> {
    let output = OutputDirectory::new(output_dir, config.site.extension());

    match config.download.strategy {
        StrategyKind::Direct => {
            let client = http::create_async_client(&config)?;
            let fetcher = HttpListingFetcher::new(Arc::clone(&config), client.clone(), collection)?;
            let strategy = DirectExportDownloader::new(client, Arc::clone(&config));
            run_crawl(CrawlJob {
                collection,
                config: &config,
                fetcher: &fetcher,
                strategy: &strategy,
                output: &output,
                list_only,
                shutdown,
            })
            .await
        }
        StrategyKind::Browser => {
            run_with_browser(&config, collection, &output, list_only, shutdown).await
        }
    }
}

#[cfg(feature = "browser")]
async fn run_with_browser(
    config: &Arc<Config>,
    collection: &str,
    output: &OutputDirectory,
    list_only: bool,
    shutdown: ShutdownSignal,
) -> Result<RunReport> {
    use crate::services::browser::{BrowserDriver, BrowserListingFetcher, ChromiumDriver};
    use crate::services::download::BrowserExportDownloader;

    output.ensure_exists().await?;
    let driver: Arc<dyn BrowserDriver> =
        Arc::new(ChromiumDriver::launch(&config.download, output.root()).await?);
    let fetcher = BrowserListingFetcher::new(Arc::clone(&driver), Arc::clone(config), collection)?;
    let strategy = BrowserExportDownloader::new(driver, Arc::clone(config));

    run_crawl(CrawlJob {
        collection,
        config,
        fetcher: &fetcher,
        strategy: &strategy,
        output,
        list_only,
        shutdown,
    })
    .await
}

#[cfg(not(feature = "browser"))]
async fn run_with_browser(
    _config: &Arc<Config>,
    _collection: &str,
    _output: &OutputDirectory,
    _list_only: bool,
    _shutdown: ShutdownSignal,
) -> Result<RunReport> {
    Err(crate::error::AppError::config(
        "the browser strategy needs the `browser` feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DownloadOutcome, MatchKind, StopReason};
    use crate::testing::{RecordingStrategy, ScriptedFetcher, listing};
    use tempfile::TempDir;

    fn config() -> Config {
        let mut config = Config::default();
        config.crawler.request_delay_ms = 0;
        config
    }

    async fn crawl(
        fetcher: &ScriptedFetcher,
        strategy: &RecordingStrategy,
        output: &OutputDirectory,
        list_only: bool,
    ) -> RunReport {
        let config = config();
        run_crawl(CrawlJob {
            collection: "77",
            config: &config,
            fetcher,
            strategy,
            output,
            list_only,
            shutdown: ShutdownSignal::new(),
        })
        .await
        .unwrap()
    }

    fn two_pages() -> ScriptedFetcher {
        ScriptedFetcher::new()
            .page(listing(&[("1", "First"), ("2", "Second"), ("3", "Third")]))
            .page(listing(&[("4", "Fourth"), ("5", "Fifth"), ("6", "Sixth")]))
            .page(listing(&[]))
    }

    #[tokio::test]
    async fn test_full_run_downloads_everything() {
        let tmp = TempDir::new().unwrap();
        let output = OutputDirectory::new(tmp.path().join("out"), "epub");
        let strategy = RecordingStrategy::new();

        let report = crawl(&two_pages(), &strategy, &output, false).await;

        assert_eq!(report.discovered, 6);
        assert_eq!(report.tally.successful, 6);
        assert_eq!(report.state, CrawlState::Done(StopReason::EmptyPage { page: 3 }));
        assert_eq!(output.completed_files().await.unwrap().len(), 6);
        assert!(report.output_dir.is_absolute());
        assert!(strategy.is_shut_down());
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let tmp = TempDir::new().unwrap();
        let output = OutputDirectory::new(tmp.path(), "epub");

        let first = RecordingStrategy::new();
        crawl(&two_pages(), &first, &output, false).await;
        let files_after_first = output.completed_files().await.unwrap();

        let second = RecordingStrategy::new();
        let report = crawl(&two_pages(), &second, &output, false).await;

        assert!(second.calls().is_empty());
        assert_eq!(report.tally.skipped, 6);
        assert_eq!(report.tally.successful, 0);
        assert_eq!(output.completed_files().await.unwrap(), files_after_first);
    }

    #[tokio::test]
    async fn test_first_page_failure_downloads_nothing() {
        let tmp = TempDir::new().unwrap();
        let output = OutputDirectory::new(tmp.path(), "epub");
        let strategy = RecordingStrategy::new();

        let report = crawl(&ScriptedFetcher::new().failure(), &strategy, &output, false).await;

        assert!(matches!(
            report.state,
            CrawlState::Aborted(AbortReason::FirstPageFailed { .. })
        ));
        assert_eq!(report.discovered, 0);
        assert!(strategy.calls().is_empty());
        assert!(strategy.is_shut_down());
    }

    #[tokio::test]
    async fn test_existing_export_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let output = OutputDirectory::new(tmp.path(), "epub");
        output.write_bytes("42_My_Story.epub", b"epub").await.unwrap();

        let fetcher = ScriptedFetcher::new()
            .page(listing(&[("42", "My Story"), ("43", "Other Story")]))
            .page(listing(&[]));
        let strategy = RecordingStrategy::new();
        let report = crawl(&fetcher, &strategy, &output, false).await;

        assert_eq!(strategy.calls(), vec!["43"]);
        assert_eq!(report.tally.skipped, 1);
        assert_eq!(
            report.items[0].outcome,
            DownloadOutcome::SkippedExisting {
                path: tmp.path().join("42_My_Story.epub"),
                kind: MatchKind::Exact,
            }
        );
    }

    #[tokio::test]
    async fn test_auth_wall_during_downloads_aborts_run() {
        let tmp = TempDir::new().unwrap();
        let output = OutputDirectory::new(tmp.path(), "epub");
        let strategy = RecordingStrategy::new().auth_wall_at("2");

        let report = crawl(&two_pages(), &strategy, &output, false).await;

        assert!(matches!(
            report.state,
            CrawlState::Aborted(AbortReason::AuthRequired { .. })
        ));
        assert_eq!(report.tally.successful, 1);
        assert!(tmp.path().join("1_First.epub").exists());
    }

    #[tokio::test]
    async fn test_list_only_downloads_nothing() {
        let tmp = TempDir::new().unwrap();
        let output = OutputDirectory::new(tmp.path().join("never"), "epub");
        let strategy = RecordingStrategy::new();

        let report = crawl(&two_pages(), &strategy, &output, true).await;

        assert_eq!(report.discovered, 6);
        assert!(strategy.calls().is_empty());
        assert!(report.state.is_done());
        assert!(!tmp.path().join("never").exists());
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let tmp = TempDir::new().unwrap();
        let output = OutputDirectory::new(tmp.path(), "epub");
        let strategy = RecordingStrategy::new();

        let report = crawl(&two_pages(), &strategy, &output, false).await;
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["collection"], "77");
        assert_eq!(json["state"]["state"], "done");
        assert_eq!(json["items"].as_array().unwrap().len(), 6);
    }
}
