//! Duplicate detection.
//!
//! Two questions are answered here: has this identity already been seen in
//! the current run, and does the output directory already hold this item.
//! The second check cannot rely on identity alone because the site may
//! rename or re-upload items between runs, so it falls back to a fuzzy
//! comparison of normalized labels.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{ItemRef, MatchKind, MatchingConfig};
use crate::storage::OutputDirectory;
use crate::utils::filename::{normalize_for_match, sanitize_label};

/// Whether an item is new to the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    HardDuplicate,
}

/// Result of looking an item up in the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskMatch {
    NotFound,
    ExactMatch(PathBuf),
    FuzzyMatch(PathBuf),
}

impl DiskMatch {
    pub fn is_found(&self) -> bool {
        !matches!(self, Self::NotFound)
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound => None,
            Self::ExactMatch(path) | Self::FuzzyMatch(path) => Some(path),
        }
    }

    pub fn kind(&self) -> Option<MatchKind> {
        match self {
            Self::NotFound => None,
            Self::ExactMatch(_) => Some(MatchKind::Exact),
            Self::FuzzyMatch(_) => Some(MatchKind::Fuzzy),
        }
    }
}

#[derive(Debug, Clone)]
struct IndexedFile {
    path: PathBuf,
    file_name: String,
    stem: String,
    normalized: String,
}

impl IndexedFile {
    fn from_path(path: PathBuf) -> Option<Self> {
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        let stem = path.file_stem()?.to_string_lossy().into_owned();
        let normalized = normalize_for_match(&stem);
        Some(Self {
            path,
            file_name,
            stem,
            normalized,
        })
    }

    fn has_token(&self, identity: &str) -> bool {
        self.stem
            .split(|c: char| !c.is_alphanumeric())
            .any(|token| token == identity)
    }
}

/// Snapshot of completed output files.
#[derive(Debug, Clone, Default)]
pub struct OutputIndex {
    files: Vec<IndexedFile>,
}

impl OutputIndex {
    /// Build an index from already-listed paths.
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut index = Self::default();
        for path in paths {
            index.insert(path);
        }
        index
    }

    /// Build an index from the completed files currently on disk.
    pub async fn scan(output: &OutputDirectory) -> Result<Self> {
        Ok(Self::from_paths(output.completed_files().await?))
    }

    /// Record a file produced during this run.
    pub fn insert(&mut self, path: PathBuf) {
        if self.files.iter().any(|f| f.path == path) {
            return;
        }
        if let Some(file) = IndexedFile::from_path(path) {
            self.files.push(file);
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Identity and label based duplicate detection.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    fuzzy: bool,
    fuzzy_min_len: usize,
    max_label_len: usize,
}

impl Deduplicator {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            fuzzy: config.fuzzy,
            fuzzy_min_len: config.fuzzy_min_len,
            max_label_len: config.max_label_len,
        }
    }

    /// Hard duplicate iff the identity was already seen this run.
    pub fn classify(&self, item: &ItemRef, seen: &HashSet<String>) -> Classification {
        if seen.contains(&item.identity) {
            Classification::HardDuplicate
        } else {
            Classification::New
        }
    }

    /// Look for an existing output file for an item.
    ///
    /// Checks, in order: identity token or naming template, identity
    /// substring, then fuzzy label containment.
    pub fn exists_on_disk(&self, identity: &str, label: &str, index: &OutputIndex) -> DiskMatch {
        if !identity.is_empty() {
            let safe_label = sanitize_label(label, self.max_label_len);
            let templates = [
                format!("{identity}_{safe_label}"),
                safe_label.clone(),
                identity.to_string(),
            ];

            let exact = index.files.iter().find(|file| {
                file.has_token(identity)
                    || templates
                        .iter()
                        .any(|name| !name.is_empty() && file.stem == *name)
            });
            if let Some(file) = exact {
                return DiskMatch::ExactMatch(file.path.clone());
            }

            if let Some(file) = index.files.iter().find(|f| f.file_name.contains(identity)) {
                return DiskMatch::ExactMatch(file.path.clone());
            }
        }

        if let Some(path) = self.fuzzy_match(label, index) {
            return DiskMatch::FuzzyMatch(path);
        }

        DiskMatch::NotFound
    }

    fn fuzzy_match(&self, label: &str, index: &OutputIndex) -> Option<PathBuf> {
        if !self.fuzzy || label.chars().count() <= self.fuzzy_min_len {
            return None;
        }

        let wanted = normalize_for_match(label);
        if wanted.chars().count() <= self.fuzzy_min_len {
            return None;
        }

        index
            .files
            .iter()
            .filter(|file| file.normalized.chars().count() > self.fuzzy_min_len)
            .find(|file| file.normalized.contains(&wanted) || wanted.contains(&file.normalized))
            .map(|file| file.path.clone())
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(&MatchingConfig::default())
    }
}
