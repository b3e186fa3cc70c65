//! Trigram similarity
//!
//! Same decomposition as PostgreSQL's pg_trgm: each alphanumeric word is
//! padded with two leading blanks and one trailing blank, and the distinct
//! three-character windows form the trigram set. Similarity is the Jaccard
//! index of two such sets.

use std::collections::BTreeSet;

/// Default cut-off below which two strings are not considered similar
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.3;

/// Distinct trigrams of `text`, lowercased
pub fn trigrams(text: &str) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars().flat_map(char::to_lowercase))
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }
    set
}

/// Jaccard similarity of two trigram sets, in `[0, 1]`
pub fn set_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    shared as f32 / union as f32
}

/// Trigram similarity of two strings
pub fn similarity(a: &str, b: &str) -> f32 {
    set_similarity(&trigrams(a), &trigrams(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_padding() {
        let t = trigrams("cat");
        let expected: BTreeSet<String> = ["  c", " ca", "cat", "at "]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(t, expected);
    }

    #[test]
    fn test_words_split_on_punctuation() {
        let t = trigrams("a-b");
        assert!(t.contains("  a"));
        assert!(t.contains("  b"));
        assert!(!t.iter().any(|g| g.contains('-')));
    }

    #[test]
    fn test_identical_strings() {
        assert!((similarity("hello", "hello") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_typo_is_similar() {
        assert!(similarity("hello", "helo") >= DEFAULT_SIMILARITY_THRESHOLD);
        assert!(similarity("hello", "world") < DEFAULT_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_empty_input_scores_zero() {
        assert_eq!(similarity("", "hello"), 0.0);
        assert!(trigrams("  --  ").is_empty());
    }
}
