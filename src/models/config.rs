//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Endpoint templates and link patterns of the listing site
    #[serde(default)]
    pub site: SiteConfig,

    /// Login detection and session cookie
    #[serde(default)]
    pub auth: AuthConfig,

    /// Label preprocessing settings
    #[serde(default)]
    pub cleaning: CleaningConfig,

    /// On-disk duplicate detection settings
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Download strategy settings
    #[serde(default)]
    pub download: DownloadConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(config) => {
                log::info!("Loaded configuration from {}", path.as_ref().display());
                config
            }
            Err(e) => {
                log::warn!(
                    "Config load failed from {:?}: {}. Using defaults.",
                    path.as_ref(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.page_size == 0 {
            return Err(AppError::validation("crawler.page_size must be > 0"));
        }
        if self.crawler.max_pages == 0 {
            return Err(AppError::validation("crawler.max_pages must be > 0"));
        }
        if self.crawler.stale_page_limit == 0 {
            return Err(AppError::validation(
                "crawler.stale_page_limit must be > 0",
            ));
        }
        if !self.site.listing_url.contains("{page}") {
            return Err(AppError::validation(
                "site.listing_url must contain a {page} placeholder",
            ));
        }
        if !self.site.export_url.contains("{id}") {
            return Err(AppError::validation(
                "site.export_url must contain an {id} placeholder",
            ));
        }
        for (name, pattern) in [
            ("site.item_href_pattern", &self.site.item_href_pattern),
            ("site.group_href_pattern", &self.site.group_href_pattern),
        ] {
            let re = Regex::new(pattern)
                .map_err(|e| AppError::validation(format!("{name} is invalid: {e}")))?;
            if re.captures_len() < 2 {
                return Err(AppError::validation(format!(
                    "{name} needs a capture group for the identity"
                )));
            }
        }
        if self.site.extension.trim_matches('.').is_empty() {
            return Err(AppError::validation("site.extension is empty"));
        }
        if self.matching.max_label_len == 0 {
            return Err(AppError::validation("matching.max_label_len must be > 0"));
        }
        if self.download.wait_timeout_secs == 0 {
            return Err(AppError::validation(
                "download.wait_timeout_secs must be > 0",
            ));
        }
        if self.download.poll_interval_ms == 0 {
            return Err(AppError::validation(
                "download.poll_interval_ms must be > 0",
            ));
        }
        Ok(())
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Items requested per listing page
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Hard ceiling on listing pages fetched in one run
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,

    /// Consecutive pages without a new identity before the crawl stops
    #[serde(default = "defaults::stale_page_limit")]
    pub stale_page_limit: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            page_size: defaults::page_size(),
            max_pages: defaults::max_pages(),
            stale_page_limit: defaults::stale_page_limit(),
        }
    }
}

/// Endpoint templates and link patterns.
///
/// Templates use `{collection}`, `{page}`, `{page_size}`, `{group}` and
/// `{id}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Paginated listing of one collection
    #[serde(default = "defaults::listing_url")]
    pub listing_url: String,

    /// Listing of a single group (folder)
    #[serde(default = "defaults::group_url")]
    pub group_url: String,

    /// Export endpoint for one item
    #[serde(default = "defaults::export_url")]
    pub export_url: String,

    /// Pattern matched against item link hrefs; capture 1 is the identity
    #[serde(default = "defaults::item_href_pattern")]
    pub item_href_pattern: String,

    /// Pattern matched against group link hrefs; capture 1 is the group id
    #[serde(default = "defaults::group_href_pattern")]
    pub group_href_pattern: String,

    /// Selector that only matches when a further page exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_selector: Option<String>,

    /// Extension of exported files, without the dot
    #[serde(default = "defaults::extension")]
    pub extension: String,
}

impl SiteConfig {
    /// URL of one listing page.
    pub fn listing_url_for(&self, collection: &str, page: u32, page_size: usize) -> String {
        fill_template(
            &self.listing_url,
            &[
                ("collection", collection),
                ("page", &page.to_string()),
                ("page_size", &page_size.to_string()),
            ],
        )
    }

    /// URL of a group listing.
    pub fn group_url_for(&self, collection: &str, group: &str) -> String {
        fill_template(
            &self.group_url,
            &[("collection", collection), ("group", group), ("page", "1")],
        )
    }

    /// URL of the export endpoint for an item.
    pub fn export_url_for(&self, identity: &str) -> String {
        fill_template(&self.export_url, &[("id", identity)])
    }

    /// Extension without any leading dot.
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            listing_url: defaults::listing_url(),
            group_url: defaults::group_url(),
            export_url: defaults::export_url(),
            item_href_pattern: defaults::item_href_pattern(),
            group_href_pattern: defaults::group_href_pattern(),
            next_page_selector: None,
            extension: defaults::extension(),
        }
    }
}

fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |acc, (key, value)| {
            acc.replace(&format!("{{{key}}}"), value)
        })
}

/// Login detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Substrings of a final URL that indicate a login redirect
    #[serde(default = "defaults::login_url_markers")]
    pub login_url_markers: Vec<String>,

    /// Selector whose presence marks a page as a login wall
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_form_selector: Option<String>,

    /// Raw `Cookie` header sent with every HTTP request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
}

impl AuthConfig {
    /// Whether a final URL points at a login surface.
    pub fn is_login_url(&self, url: &str) -> bool {
        self.login_url_markers
            .iter()
            .any(|marker| !marker.is_empty() && url.contains(marker.as_str()))
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_url_markers: defaults::login_url_markers(),
            login_form_selector: None,
            cookie: None,
        }
    }
}

/// Text cleaning/preprocessing settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CleaningConfig {
    /// Patterns to remove from labels
    #[serde(default)]
    pub label_remove_patterns: Vec<String>,
}

impl CleaningConfig {
    /// Clean a label string.
    pub fn clean_label(&self, text: &str) -> String {
        let mut result = Self::normalize_whitespace(text);

        for pattern in &self.label_remove_patterns {
            result = result.replace(pattern, "");
        }

        result.trim().to_string()
    }

    fn normalize_whitespace(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Duplicate detection against existing output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Enable fuzzy label matching
    #[serde(default = "defaults::fuzzy")]
    pub fuzzy: bool,

    /// Normalized strings of this length or shorter never fuzzy-match
    #[serde(default = "defaults::fuzzy_min_len")]
    pub fuzzy_min_len: usize,

    /// Maximum label length kept in output file names
    #[serde(default = "defaults::max_label_len")]
    pub max_label_len: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy: defaults::fuzzy(),
            fuzzy_min_len: defaults::fuzzy_min_len(),
            max_label_len: defaults::max_label_len(),
        }
    }
}

/// Which download capability performs the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum StrategyKind {
    /// Stream the export response straight to disk
    #[default]
    Direct,
    /// Trigger the export in a browser and watch the output directory
    Browser,
}

/// Download strategy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default)]
    pub strategy: StrategyKind,

    /// How long a browser-triggered download may take to appear and settle
    #[serde(default = "defaults::wait_timeout")]
    pub wait_timeout_secs: u64,

    /// Interval between output directory samples
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_ms: u64,

    /// Run the browser without a window
    #[serde(default = "defaults::headless")]
    pub headless: bool,

    /// Browser binary; auto-detected when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_executable: Option<PathBuf>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            wait_timeout_secs: defaults::wait_timeout(),
            poll_interval_ms: defaults::poll_interval(),
            headless: defaults::headless(),
            browser_executable: None,
        }
    }
}

mod defaults {
    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        1000
    }
    pub fn page_size() -> usize {
        45
    }
    pub fn max_pages() -> u32 {
        100
    }
    pub fn stale_page_limit() -> u32 {
        1
    }

    // Site defaults
    pub fn listing_url() -> String {
        "https://www.sofurry.com/browse/user/stories?uid={collection}&stories-display={page_size}&page={page}".into()
    }
    pub fn group_url() -> String {
        "https://www.sofurry.com/browse/folder/stories?by={collection}&folder={group}".into()
    }
    pub fn export_url() -> String {
        "https://www.sofurry.com/export/ePub?id={id}".into()
    }
    pub fn item_href_pattern() -> String {
        r"^/view/(\d+)$".into()
    }
    pub fn group_href_pattern() -> String {
        r"[?&]folder=(\d+)".into()
    }
    pub fn extension() -> String {
        "epub".into()
    }

    // Auth defaults
    pub fn login_url_markers() -> Vec<String> {
        vec!["/user/login".into(), "/login".into()]
    }

    // Matching defaults
    pub fn fuzzy() -> bool {
        true
    }
    pub fn fuzzy_min_len() -> usize {
        3
    }
    pub fn max_label_len() -> usize {
        200
    }

    // Download defaults
    pub fn wait_timeout() -> u64 {
        120
    }
    pub fn poll_interval() -> u64 {
        500
    }
    pub fn headless() -> bool {
        true
    }
}
