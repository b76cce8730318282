//! Discovered items, groups, and the ordered crawl result.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Where an item reference was discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// Listed directly on a collection page
    Direct,
    /// Representative item of a first-page group
    Group { title: String },
}

/// A discovered item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    /// Stable unique key extracted from the item link
    pub identity: String,

    /// Display title, not guaranteed unique
    pub label: String,

    pub origin: Origin,
}

impl ItemRef {
    /// An item listed directly on a page.
    pub fn direct(identity: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            label: label.into(),
            origin: Origin::Direct,
        }
    }

    /// Re-label an item as the representative of a group.
    pub fn into_group_representative(self, group_title: &str) -> Self {
        Self {
            label: format!("[{}] {}", group_title, self.label),
            origin: Origin::Group {
                title: group_title.to_string(),
            },
            identity: self.identity,
        }
    }
}

/// A site-side collection surfaced on the root listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub identity: String,
    pub title: String,
}

/// One fetched listing page.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub items: Vec<ItemRef>,

    /// Only meaningful on page 1
    pub groups: Vec<GroupRef>,

    /// Whether the listing suggests a further page exists
    pub has_more: bool,
}

/// Ordered, identity-unique list of items to download.
#[derive(Debug, Clone, Default)]
pub struct CrawlResult {
    items: Vec<ItemRef>,
    identities: HashSet<String>,
}

impl CrawlResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item; returns `false` and drops it when the identity is
    /// already present.
    pub fn push(&mut self, item: ItemRef) -> bool {
        if !self.identities.insert(item.identity.clone()) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn items(&self) -> &[ItemRef] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ItemRef> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a CrawlResult {
    type Item = &'a ItemRef;
    type IntoIter = std::slice::Iter<'a, ItemRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_representative_label() {
        let item = ItemRef::direct("7", "Chapter One").into_group_representative("Saga");
        assert_eq!(item.label, "[Saga] Chapter One");
        assert_eq!(
            item.origin,
            Origin::Group {
                title: "Saga".to_string()
            }
        );
        assert_eq!(item.identity, "7");
    }

    #[test]
    fn test_crawl_result_rejects_duplicate_identity() {
        let mut result = CrawlResult::new();
        assert!(result.push(ItemRef::direct("1", "First")));
        assert!(result.push(ItemRef::direct("2", "Second")));
        assert!(!result.push(ItemRef::direct("1", "First again")));

        let labels: Vec<_> = result.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["First", "Second"]);
    }
}
