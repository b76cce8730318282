//! Service layer for the crawler application.
//!
//! This module contains the business logic for:
//! - Listing fetchers over HTTP and a browser (`Fetcher`)
//! - Run and on-disk duplicate detection (`Deduplicator`)
//! - Download strategies and their executor (`DownloadExecutor`)

pub mod browser;
pub mod dedup;
pub mod download;
pub mod listing;

pub use browser::{BrowserDriver, BrowserListingFetcher};
#[cfg(feature = "browser")]
pub use browser::ChromiumDriver;
pub use dedup::{Classification, Deduplicator, DiskMatch, OutputIndex};
pub use download::{
    BrowserExportDownloader, DirectExportDownloader, DownloadExecutor, DownloadStrategy,
    ExecutionSummary,
};
pub use listing::{Fetcher, HttpListingFetcher, ListingParser};
