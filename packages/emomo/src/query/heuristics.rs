//! Rule-based query classification.
//!
//! Always available and deterministic. Used when the LLM path is disabled,
//! skipped, or fails.

use crate::query::prompts::{meme_phrase, EMOTION_WORDS, INTERNET_MEMES, SUBJECTS};
use crate::types::plan::{Intent, PlanFilters, RetrievalPlan};

/// Quote characters that mark a literal-text query.
const QUOTE_CHARS: &[char] = &[
    '"', '\'', '\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}', '\u{300c}', '\u{300d}',
    '\u{300e}', '\u{300f}',
];

/// Queries up to this many characters with no lexicon hit are treated as subjects.
const SHORT_QUERY_MAX_CHARS: usize = 6;

/// Queries up to this many characters need exact matching.
const EXACT_MATCH_MAX_CHARS: usize = 4;

/// Dense weight for each heuristic intent.
pub fn dense_weight_for(intent: Intent) -> f32 {
    match intent {
        Intent::Text => 0.3,
        Intent::Subject => 0.5,
        Intent::Meme | Intent::Composite => 0.6,
        Intent::Action | Intent::Semantic => 0.7,
        Intent::Emotion | Intent::Scene => 0.8,
    }
}

pub fn has_quote(text: &str) -> bool {
    text.contains(QUOTE_CHARS)
}

pub fn contains_digit(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}

/// Emotion words found in `text`, in lexicon order.
pub fn detect_emotions(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    EMOTION_WORDS
        .iter()
        .copied()
        .filter(|word| !word.is_empty() && lower.contains(&word.to_lowercase()))
        .collect()
}

fn has_meme(text: &str) -> bool {
    let lower = text.to_lowercase();
    INTERNET_MEMES
        .iter()
        .map(|entry| meme_phrase(entry))
        .any(|phrase| !phrase.is_empty() && lower.contains(&phrase.to_lowercase()))
}

fn find_subject(text: &str) -> Option<&'static str> {
    SUBJECTS.iter().copied().find(|subject| text.contains(subject))
}

/// Classify a query without calling any model.
pub fn heuristic_plan(query: &str) -> RetrievalPlan {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return RetrievalPlan::new(Intent::Semantic, query, dense_weight_for(Intent::Semantic));
    }

    let mut filters = None;

    let intent = if has_quote(trimmed) || contains_digit(trimmed) {
        Intent::Text
    } else {
        let has_emotion = !detect_emotions(trimmed).is_empty();
        let subject = find_subject(trimmed);

        match subject {
            Some(subject) => {
                filters = Some(PlanFilters::for_category(subject));
                if has_emotion {
                    Intent::Composite
                } else {
                    Intent::Subject
                }
            }
            None if has_meme(trimmed) => Intent::Meme,
            None if has_emotion => Intent::Emotion,
            None if trimmed.chars().count() <= SHORT_QUERY_MAX_CHARS => Intent::Subject,
            None => Intent::Semantic,
        }
    };

    let mut plan = RetrievalPlan::new(intent, query, dense_weight_for(intent))
        .with_exact_match(query.chars().count() <= EXACT_MATCH_MAX_CHARS);
    plan.filters = filters;
    plan
}
