//! Headword normalization
//!
//! The normalized form is the catalog's natural dedup key, so every writer
//! and every lookup must agree on it.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonicalize a headword for storage and comparison:
/// - trims leading/trailing whitespace
/// - strips diacritics (NFD, combining marks removed)
/// - lowercases
/// - compresses internal whitespace runs into one space
///
/// Hyphens and apostrophes are preserved.
pub fn normalize_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(trimmed.len());
    let mut prev_space = false;
    for ch in trimmed.nfd().filter(|c| !is_combining_mark(*c)) {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
            continue;
        }
        prev_space = false;
        out.extend(ch.to_lowercase());
    }
    out
}
