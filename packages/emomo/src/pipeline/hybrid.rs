//! Hybrid search planning.
//!
//! Maps a retrieval strategy to prefetch sizes for the dense and lexical
//! legs, and builds the lexical query string from a plan.

use std::collections::HashSet;

use crate::traits::vector_store::{HybridSearchPlan, DEFAULT_RRF_K};
use crate::types::plan::{RetrievalPlan, SearchStrategy};

/// Result count used when the caller asks for zero or fewer.
pub const DEFAULT_TOP_K: usize = 20;

/// Upper bound on either leg's prefetch.
pub const MAX_PREFETCH: usize = 200;

/// Build prefetch sizes for a hybrid search.
///
/// With dense weight `w`:
/// - dense prefetch = `floor(top_k * (1 + 3w))`
/// - lexical prefetch = `floor(top_k * (4 - 3w))`
///
/// Both are clamped to `[1, MAX_PREFETCH]`. Both legs are always requested.
pub fn build_hybrid_plan(strategy: &SearchStrategy, top_k: i64) -> HybridSearchPlan {
    let top_k = if top_k <= 0 {
        DEFAULT_TOP_K as f64
    } else {
        top_k as f64
    };

    let weight = if strategy.dense_weight.is_nan() {
        SearchStrategy::default().dense_weight
    } else {
        strategy.dense_weight
    };
    let weight = f64::from(weight).clamp(0.0, 1.0);

    let dense = (top_k * (1.0 + 3.0 * weight)).floor();
    let lexical = (top_k * (4.0 - 3.0 * weight)).floor();

    HybridSearchPlan {
        use_dense: true,
        use_lexical: true,
        dense_limit: clamp_prefetch(dense),
        lexical_limit: clamp_prefetch(lexical),
        rrf_k: DEFAULT_RRF_K,
    }
}

fn clamp_prefetch(value: f64) -> usize {
    value.clamp(1.0, MAX_PREFETCH as f64) as usize
}

/// Build the lexical query for a plan.
///
/// Keywords first, then synonyms unless exact matching is required.
/// Case-insensitive dedup, first occurrence wins.
pub fn build_lexical_query(plan: &RetrievalPlan) -> String {
    let synonyms: &[String] = if plan.strategy.need_exact_match {
        &[]
    } else {
        &plan.synonyms
    };

    let mut seen = HashSet::new();
    plan.keywords
        .iter()
        .chain(synonyms)
        .map(|term| term.trim())
        .filter(|term| !term.is_empty() && seen.insert(term.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ")
}
