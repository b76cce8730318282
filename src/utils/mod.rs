//! Utility functions and helpers.

pub mod filename;
pub mod http;
pub mod shutdown;

use regex::Regex;
use url::Url;

/// Path plus query of an href, so patterns can be written against the
/// site-relative form regardless of how the link was written.
pub fn relative_href(base: &Url, href: &str) -> String {
    match base.join(href) {
        Ok(url) => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        },
        Err(_) => href.to_string(),
    }
}

/// Extract an identity from an href using the first capture group.
pub fn extract_identity(pattern: &Regex, href: &str) -> Option<String> {
    pattern
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
