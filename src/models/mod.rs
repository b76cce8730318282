// src/models/mod.rs

//! Domain models for the crawler application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod item;
mod outcome;

// Re-export all public types
pub use config::{
    AuthConfig, CleaningConfig, Config, CrawlerConfig, DownloadConfig, MatchingConfig, SiteConfig,
    StrategyKind,
};
pub use item::{CrawlResult, GroupRef, ItemRef, ListingPage, Origin};
pub use outcome::{
    AbortReason, CrawlState, DownloadOutcome, DownloadTally, ItemReport, MatchKind, RunReport,
    StopReason,
};
