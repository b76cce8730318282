//! Per-item download outcomes and run-level reporting.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an existing output file was matched to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Fuzzy,
}

/// Result of processing one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    SkippedExisting { path: PathBuf, kind: MatchKind },
    Downloaded { path: PathBuf },
    Failed { reason: String },
}

/// Run-level counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTally {
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl DownloadTally {
    pub fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::SkippedExisting { .. } => self.skipped += 1,
            DownloadOutcome::Downloaded { .. } => self.successful += 1,
            DownloadOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.successful + self.failed + self.skipped
    }
}

/// Why a crawl finished normally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// A page listed nothing
    EmptyPage { page: u32 },
    /// The listing reported no further page
    LastPage { page: u32 },
    /// Consecutive pages added no new identity
    NoNewItems { page: u32 },
    /// The page ceiling was reached
    PageCeiling { pages: u32 },
    /// A later page failed; collected items are kept
    FetchFailed { page: u32 },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPage { page } => write!(f, "page {page} was empty"),
            Self::LastPage { page } => write!(f, "page {page} was the last page"),
            Self::NoNewItems { page } => write!(f, "page {page} added no new items"),
            Self::PageCeiling { pages } => write!(f, "reached the ceiling of {pages} pages"),
            Self::FetchFailed { page } => write!(f, "page {page} failed to load"),
        }
    }
}

/// Why a crawl produced no usable result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    FirstPageFailed { message: String },
    AuthRequired { url: String },
    Interrupted,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstPageFailed { message } => write!(f, "first page failed: {message}"),
            Self::AuthRequired { url } => write!(f, "login required ({url})"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CrawlState {
    Done(StopReason),
    Aborted(AbortReason),
}

impl CrawlState {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// An item together with what happened to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub identity: String,
    pub label: String,
    pub outcome: DownloadOutcome,
}

/// Summary of one crawl invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub collection: String,
    pub state: CrawlState,
    pub pages_fetched: u32,
    pub group_fetches: u32,
    pub discovered: usize,
    pub tally: DownloadTally,
    pub output_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items: Vec<ItemReport>,
}
