//! Hashtag and mention extraction from message text.

use std::collections::BTreeSet;

use crate::constants::{HASHTAG_PREFIX, MENTION_PREFIX};

/// Whether a character may appear inside a user tag or a hashtag.
pub fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// A user tag is a non-empty run of tag characters, without the `@`.
pub fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty() && tag.chars().all(is_tag_char)
}

/// Hashtags found in `text`, without their leading `#`.
pub fn hashtags(text: &str) -> BTreeSet<String> {
    prefixed_words(text, HASHTAG_PREFIX)
}

/// User tags mentioned in `text`, without their leading `@`.
pub fn mentions(text: &str) -> BTreeSet<String> {
    prefixed_words(text, MENTION_PREFIX)
}

/// Strip a leading `#` or `@` from a search term.
pub fn strip_marker(term: &str) -> &str {
    term.trim()
        .trim_start_matches(|c| c == HASHTAG_PREFIX || c == MENTION_PREFIX)
}

fn prefixed_words(text: &str, prefix: char) -> BTreeSet<String> {
    text.split_whitespace()
        .filter_map(|word| word.strip_prefix(prefix))
        .map(|rest| {
            // "#rust," and "@bob!" still count, trailing punctuation is cut.
            let end = rest
                .char_indices()
                .find(|(_, c)| !is_tag_char(*c))
                .map_or(rest.len(), |(i, _)| i);
            rest[..end].trim_end_matches('.').to_string()
        })
        .filter(|tag| !tag.is_empty())
        .collect()
}
