//! Text composition for embedding and lexical indexing.

use std::collections::HashSet;

use crate::query::heuristics::detect_emotions;

/// Description characters kept in the embedded text.
pub const MAX_EMBEDDED_DESCRIPTION_CHARS: usize = 120;

/// Collapse runs of whitespace into single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-normalized description, truncated for embedding.
pub fn compact_description(text: &str) -> String {
    normalize_whitespace(text)
        .chars()
        .take(MAX_EMBEDDED_DESCRIPTION_CHARS)
        .collect()
}

/// Trim, drop empties and duplicates, keep first-seen order.
pub fn dedupe_strings<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_string())
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

/// Text sent to the embedding provider.
///
/// ```text
/// desc:<compact description>
/// tags:<tag> <tag>
/// emotions:<word> <word>
/// ```
///
/// Empty segments are omitted.
pub fn embedding_text(description: &str, tags: &[String]) -> String {
    let mut segments = Vec::with_capacity(3);

    let desc = compact_description(description);
    if !desc.is_empty() {
        segments.push(format!("desc:{desc}"));
    }

    let tags = dedupe_strings(tags);
    if !tags.is_empty() {
        segments.push(format!("tags:{}", tags.join(" ")));
    }

    let emotions = dedupe_strings(detect_emotions(description));
    if !emotions.is_empty() {
        segments.push(format!("emotions:{}", emotions.join(" ")));
    }

    segments.join("\n")
}

/// Text indexed by the lexical leg: the full description plus tags.
pub fn lexical_text(description: &str, tags: &[String]) -> String {
    let mut segments = Vec::with_capacity(2);

    let desc = normalize_whitespace(description);
    if !desc.is_empty() {
        segments.push(desc);
    }

    let tags = dedupe_strings(tags);
    if !tags.is_empty() {
        segments.push(tags.join(" "));
    }

    segments.join("\n")
}
