// src/services/listing.rs

//! Listing fetcher service.
//!
//! Fetches one listing page (or one group listing) and turns its links into
//! item and group references using the configured href patterns.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{CleaningConfig, Config, GroupRef, ItemRef, ListingPage};
use crate::utils::{extract_identity, relative_href};

/// Source of listing pages.
///
/// Errors are `AppError::Fetch` for transient network or parse failures and
/// `AppError::AuthRequired` when the site demands a login; an empty page is
/// never used to signal an error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a collection listing page; pages start at 1.
    async fn fetch(&self, page: u32) -> Result<ListingPage>;

    /// Fetch the listing of a single group.
    async fn fetch_group(&self, group: &GroupRef) -> Result<ListingPage>;
}

/// Turns listing HTML into item and group references.
#[derive(Debug, Clone)]
pub struct ListingParser {
    item_pattern: Regex,
    group_pattern: Regex,
    next_page_selector: Option<String>,
    login_form_selector: Option<String>,
    cleaning: CleaningConfig,
    page_size: usize,
}

impl ListingParser {
    /// Build a parser, validating patterns and selectors up front.
    pub fn new(config: &Config) -> Result<Self> {
        let next_page_selector = config.site.next_page_selector.clone();
        let login_form_selector = config.auth.login_form_selector.clone();
        for selector in next_page_selector.iter().chain(login_form_selector.iter()) {
            parse_selector(selector)?;
        }

        Ok(Self {
            item_pattern: Regex::new(&config.site.item_href_pattern)?,
            group_pattern: Regex::new(&config.site.group_href_pattern)?,
            next_page_selector,
            login_form_selector,
            cleaning: config.cleaning.clone(),
            page_size: config.crawler.page_size,
        })
    }

    /// Parse a listing page fetched from `page_url`.
    pub fn parse(&self, html: &str, page_url: &Url) -> Result<ListingPage> {
        let document = Html::parse_document(html);

        if let Some(login) = &self.login_form_selector {
            let selector = parse_selector(login)?;
            if document.select(&selector).next().is_some() {
                return Err(AppError::auth_required(page_url.as_str()));
            }
        }

        let link_selector = parse_selector("a[href]")?;
        let mut items: Vec<ItemRef> = Vec::new();
        let mut item_positions: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<GroupRef> = Vec::new();
        let mut group_positions: HashMap<String, usize> = HashMap::new();

        for element in document.select(&link_selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let href = relative_href(page_url, href);
            let text = self.cleaning.clean_label(&element.text().collect::<String>());

            if let Some(identity) = extract_identity(&self.item_pattern, &href) {
                // Thumbnails and titles often link the same item
                match item_positions.get(&identity) {
                    Some(&pos) => {
                        if items[pos].label.is_empty() && !text.is_empty() {
                            items[pos].label = text;
                        }
                    }
                    None => {
                        item_positions.insert(identity.clone(), items.len());
                        items.push(ItemRef::direct(identity, text));
                    }
                }
            } else if let Some(identity) = extract_identity(&self.group_pattern, &href) {
                match group_positions.get(&identity) {
                    Some(&pos) => {
                        if groups[pos].title.is_empty() && !text.is_empty() {
                            groups[pos].title = text;
                        }
                    }
                    None => {
                        group_positions.insert(identity.clone(), groups.len());
                        groups.push(GroupRef {
                            identity,
                            title: text,
                        });
                    }
                }
            }
        }

        for group in groups.iter_mut().filter(|g| g.title.is_empty()) {
            group.title = format!("Group {}", group.identity);
        }

        let has_more = match &self.next_page_selector {
            Some(next) => {
                let selector = parse_selector(next)?;
                document.select(&selector).next().is_some()
            }
            None => items.len() >= self.page_size,
        };

        Ok(ListingPage {
            items,
            groups,
            has_more,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Fetches listing pages over plain HTTP.
pub struct HttpListingFetcher {
    config: Arc<Config>,
    client: Client,
    collection: String,
    parser: ListingParser,
}

impl HttpListingFetcher {
    /// Create a fetcher for one collection.
    pub fn new(config: Arc<Config>, client: Client, collection: impl Into<String>) -> Result<Self> {
        let parser = ListingParser::new(&config)?;
        Ok(Self {
            config,
            client,
            collection: collection.into(),
            parser,
        })
    }

    async fn fetch_listing(&self, url: &str, context: &str) -> Result<ListingPage> {
        log::debug!("Fetching {}: {}", context, url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::fetch(context, e))?;

        let final_url = response.url().clone();
        if final_url.as_str() != url && self.config.auth.is_login_url(final_url.path()) {
            return Err(AppError::auth_required(final_url.as_str()));
        }
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AppError::auth_required(final_url.as_str()));
        }

        let response = response
            .error_for_status()
            .map_err(|e| AppError::fetch(context, e))?;
        let html = response
            .text()
            .await
            .map_err(|e| AppError::fetch(context, e))?;

        self.parser.parse(&html, &final_url).map_err(|e| match e {
            AppError::AuthRequired { .. } => e,
            other => AppError::fetch(context, other),
        })
    }
}

#[async_trait]
impl Fetcher for HttpListingFetcher {
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

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <div class="folders">
            <a href="/browse/folder/stories?by=77&folder=9">Saga</a>
            <a href="/browse/folder/stories?by=77&folder=9"><img src="f.png"></a>
            <a href="/browse/folder/stories?by=77&folder=10"></a>
          </div>
          <div class="items">
            <a href="/view/101"><img src="thumb.png"></a>
            <a href="/view/101">  The   First Tale </a>
            <a href="https://www.sofurry.com/view/102">Second</a>
            <a href="/view/103/comments">Comments</a>
            <a href="/user/77">Author</a>
          </div>
        </body></html>
    "#;

    fn base() -> Url {
        Url::parse("https://www.sofurry.com/browse/user/stories?uid=77&page=1").unwrap()
    }

    #[test]
    fn test_parse_items_and_groups() {
        let parser = ListingParser::new(&Config::default()).unwrap();
        let page = parser.parse(LISTING, &base()).unwrap();

        let items: Vec<_> = page
            .items
            .iter()
            .map(|i| (i.identity.as_str(), i.label.as_str()))
            .collect();
        assert_eq!(items, vec![("101", "The First Tale"), ("102", "Second")]);

        let groups: Vec<_> = page
            .groups
            .iter()
            .map(|g| (g.identity.as_str(), g.title.as_str()))
            .collect();
        assert_eq!(groups, vec![("9", "Saga"), ("10", "Group 10")]);
    }

    #[test]
    fn test_has_more_from_page_size() {
        let mut config = Config::default();
        config.crawler.page_size = 2;
        let parser = ListingParser::new(&config).unwrap();
        assert!(parser.parse(LISTING, &base()).unwrap().has_more);

        config.crawler.page_size = 45;
        let parser = ListingParser::new(&config).unwrap();
        assert!(!parser.parse(LISTING, &base()).unwrap().has_more);
    }

    #[test]
    fn test_has_more_from_next_selector() {
        let mut config = Config::default();
        config.site.next_page_selector = Some("a.next".to_string());
        let parser = ListingParser::new(&config).unwrap();

        assert!(!parser.parse(LISTING, &base()).unwrap().has_more);
        let with_next = format!("{LISTING}<a class=\"next\" href=\"?page=2\">Next</a>");
        assert!(parser.parse(&with_next, &base()).unwrap().has_more);
    }

    #[test]
    fn test_login_form_is_auth_required() {
        let mut config = Config::default();
        config.auth.login_form_selector = Some("form#login".to_string());
        let parser = ListingParser::new(&config).unwrap();

        let html = r#"<form id="login"><input type="password"></form>"#;
        assert!(matches!(
            parser.parse(html, &base()),
            Err(AppError::AuthRequired { .. })
        ));
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let mut config = Config::default();
        config.site.next_page_selector = Some("[[invalid".to_string());
        assert!(ListingParser::new(&config).is_err());
    }

    #[test]
    fn test_empty_page() {
        let parser = ListingParser::new(&Config::default()).unwrap();
        let page = parser.parse("<html><body>No stories</body></html>", &base()).unwrap();
        assert!(page.items.is_empty());
        assert!(page.groups.is_empty());
        assert!(!page.has_more);
    }
}
