// src/pipeline/paginate.rs

//! Pagination controller.
//!
//! Walks listing pages one at a time and builds the crawl result:
//!
//! ```text
//! Fetching(p) -> Evaluating(p) -> ExpandingGroups (page 1 only)
//!                              -> Fetching(p + 1) | Finished
//! ```
//!
//! The walk stops on an empty page, on the site's last page, once
//! consecutive pages add no new identity, or at the page ceiling.

use std::collections::HashSet;
use std::time::Duration;

use crate::error::AppError;
use crate::models::{
    AbortReason, Config, CrawlResult, CrawlState, GroupRef, ItemRef, ListingPage, StopReason,
};
use crate::services::dedup::{Classification, Deduplicator};
use crate::services::listing::Fetcher;
use crate::utils::shutdown::ShutdownSignal;

/// What the controller produced.
#[derive(Debug)]
pub struct PaginationOutcome {
    pub state: CrawlState,
    pub result: CrawlResult,
    pub pages_fetched: u32,
    pub group_fetches: u32,
}

enum Phase {
    Fetching(u32),
    Evaluating {
        page: u32,
        listing: ListingPage,
    },
    ExpandingGroups {
        page: u32,
        groups: Vec<GroupRef>,
        added: usize,
        has_more: bool,
    },
    Finished(CrawlState),
}

/// Drives a `Fetcher` through the listing of one collection.
pub struct PaginationController<'a> {
    fetcher: &'a dyn Fetcher,
    dedup: Deduplicator,
    max_pages: u32,
    stale_page_limit: u32,
    delay: Duration,
    shutdown: ShutdownSignal,

    seen: HashSet<String>,
    result: CrawlResult,
    stale_pages: u32,
    pages_fetched: u32,
    group_fetches: u32,
}

impl<'a> PaginationController<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, config: &Config, shutdown: ShutdownSignal) -> Self {
        Self {
            fetcher,
            dedup: Deduplicator::new(&config.matching),
            max_pages: config.crawler.max_pages,
            stale_page_limit: config.crawler.stale_page_limit.max(1),
            delay: Duration::from_millis(config.crawler.request_delay_ms),
            shutdown,
            seen: HashSet::new(),
            result: CrawlResult::new(),
            stale_pages: 0,
            pages_fetched: 0,
            group_fetches: 0,
        }
    }

    /// Run until a terminal state.
    pub async fn run(mut self) -> PaginationOutcome {
        let mut phase = Phase::Fetching(1);
        let state = loop {
            phase = match phase {
                Phase::Fetching(page) => self.fetch(page).await,
                Phase::Evaluating { page, listing } => self.evaluate(page, listing),
                Phase::ExpandingGroups {
                    page,
                    groups,
                    added,
                    has_more,
                } => match self.expand_groups(&groups).await {
                    Ok(representatives) => self.advance(page, added + representatives, has_more),
                    Err(reason) => Phase::Finished(CrawlState::Aborted(reason)),
                },
                Phase::Finished(state) => break state,
            };
        };

        PaginationOutcome {
            state,
            result: self.result,
            pages_fetched: self.pages_fetched,
            group_fetches: self.group_fetches,
        }
    }

    async fn fetch(&mut self, page: u32) -> Phase {
        if self.shutdown.is_requested() {
            log::warn!("Stopping before page {}", page);
            return Phase::Finished(CrawlState::Aborted(AbortReason::Interrupted));
        }
        if page > self.max_pages {
            log::warn!("Reached the page ceiling of {}", self.max_pages);
            return Phase::Finished(CrawlState::Done(StopReason::PageCeiling {
                pages: self.max_pages,
            }));
        }

        self.pace().await;
        log::info!("Fetching page {}...", page);
        self.pages_fetched += 1;
        match self.fetcher.fetch(page).await {
            Ok(listing) => Phase::Evaluating { page, listing },
            Err(e) => Phase::Finished(Self::on_fetch_error(page, e)),
        }
    }

    fn on_fetch_error(page: u32, error: AppError) -> CrawlState {
        match error {
            AppError::AuthRequired { url } => {
                log::error!("Login required at page {}: {}", page, url);
                CrawlState::Aborted(AbortReason::AuthRequired { url })
            }
            e if page == 1 => {
                log::error!("Failed to fetch page 1: {}", e);
                CrawlState::Aborted(AbortReason::FirstPageFailed {
                    message: e.to_string(),
                })
            }
            e => {
                log::warn!("Failed to fetch page {}: {}. Keeping items found so far.", page, e);
                CrawlState::Done(StopReason::FetchFailed { page })
            }
        }
    }

    fn evaluate(&mut self, page: u32, listing: ListingPage) -> Phase {
        let ListingPage {
            items,
            groups,
            has_more,
        } = listing;
        let expand = page == 1 && !groups.is_empty();

        if items.is_empty() && !expand {
            log::info!("Page {} is empty, stopping", page);
            return Phase::Finished(CrawlState::Done(StopReason::EmptyPage { page }));
        }
        if page > 1 && !groups.is_empty() {
            log::debug!("Ignoring {} groups on page {}", groups.len(), page);
        }

        let found = items.len();
        let added = self.accept(items);
        log::info!(
            "Page {}: {} items, {} new (total {})",
            page,
            found,
            added,
            self.result.len()
        );

        if expand {
            Phase::ExpandingGroups {
                page,
                groups,
                added,
                has_more,
            }
        } else {
            self.advance(page, added, has_more)
        }
    }

    fn advance(&mut self, page: u32, added: usize, has_more: bool) -> Phase {
        if added == 0 {
            self.stale_pages += 1;
            if self.stale_pages >= self.stale_page_limit {
                log::info!("Page {} added no new items, stopping", page);
                return Phase::Finished(CrawlState::Done(StopReason::NoNewItems { page }));
            }
        } else {
            self.stale_pages = 0;
        }

        if !has_more {
            log::info!("Page {} is the last page", page);
            return Phase::Finished(CrawlState::Done(StopReason::LastPage { page }));
        }
        Phase::Fetching(page + 1)
    }

    /// One fetch per group; the first item stands for the whole group.
    async fn expand_groups(&mut self, groups: &[GroupRef]) -> Result<usize, AbortReason> {
        log::info!("Expanding {} groups...", groups.len());
        let mut added = 0;

        for group in groups {
            self.pace().await;
            self.group_fetches += 1;

            let listing = match self.fetcher.fetch_group(group).await {
                Ok(listing) => listing,
                Err(AppError::AuthRequired { url }) => {
                    log::error!("Login required for group '{}': {}", group.title, url);
                    return Err(AbortReason::AuthRequired { url });
                }
                Err(e) => {
                    log::warn!("Failed to expand group '{}': {}", group.title, e);
                    continue;
                }
            };

            let Some(first) = listing.items.into_iter().next() else {
                log::debug!("Group '{}' has no items", group.title);
                continue;
            };
            added += self.accept(vec![first.into_group_representative(&group.title)]);
        }

        log::info!("Groups added {} new items", added);
        Ok(added)
    }

    /// Classify and append; returns how many were new.
    fn accept(&mut self, items: Vec<ItemRef>) -> usize {
        let mut added = 0;
        for item in items {
            match self.dedup.classify(&item, &self.seen) {
                Classification::New => {
                    self.seen.insert(item.identity.clone());
                    if self.result.push(item) {
                        added += 1;
                    }
                }
                Classification::HardDuplicate => {
                    log::debug!("Already seen {} ({})", item.identity, item.label);
                }
            }
        }
        added
    }

    /// Politeness delay between requests.
    async fn pace(&self) {
        if self.pages_fetched + self.group_fetches > 0 && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}
