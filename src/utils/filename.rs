// src/utils/filename.rs

//! Output file naming.

use unicode_segmentation::UnicodeSegmentation;

const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Make a label safe for use in a file name.
///
/// Drops reserved and control characters, collapses whitespace, and keeps
/// at most `max_len` graphemes.
pub fn sanitize_label(label: &str, max_len: usize) -> String {
    let stripped: String = label
        .chars()
        .filter(|c| !FORBIDDEN.contains(c) && !c.is_control())
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    let truncated: String = collapsed.graphemes(true).take(max_len).collect();
    truncated.trim().trim_end_matches('.').to_string()
}

/// Canonical `{identity}_{sanitizedLabel}.{ext}` name for an item.
pub fn canonical_file_name(identity: &str, label: &str, extension: &str, max_len: usize) -> String {
    let safe = sanitize_label(label, max_len);
    if safe.is_empty() {
        format!("{identity}.{extension}")
    } else {
        format!("{identity}_{safe}.{extension}")
    }
}

/// Lower-cased, alphanumeric-only form used for fuzzy comparison.
pub fn normalize_for_match(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
