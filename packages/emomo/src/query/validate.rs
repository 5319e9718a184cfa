//! Validation and repair of model-produced plans.
//!
//! The model's JSON is deserialized leniently into [`PlanResponse`] and then
//! repaired into a [`RetrievalPlan`] that the rest of the engine can trust.

use serde::Deserialize;

use crate::error::{EmomoError, Result};
use crate::query::parser::StreamParser;
use crate::types::plan::{Intent, PlanFilters, RetrievalPlan, SearchStrategy};

pub const MIN_SEMANTIC_QUERY_CHARS: usize = 10;
pub const MAX_SEMANTIC_QUERY_CHARS: usize = 200;
pub const MAX_KEYWORDS: usize = 5;
pub const MAX_SYNONYMS: usize = 5;

/// Plan JSON as the model returns it. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanResponse {
    #[serde(default)]
    pub intent: Option<String>,

    #[serde(default)]
    pub semantic_query: Option<String>,

    #[serde(default)]
    pub keywords: Option<Vec<String>>,

    #[serde(default)]
    pub synonyms: Option<Vec<String>>,

    #[serde(default)]
    pub strategy: Option<StrategyResponse>,

    #[serde(default)]
    pub filters: Option<PlanFilters>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyResponse {
    #[serde(default)]
    pub dense_weight: Option<f32>,

    #[serde(default)]
    pub need_exact_match: Option<bool>,
}

fn clean_terms(terms: Option<Vec<String>>, cap: usize) -> Vec<String> {
    terms
        .unwrap_or_default()
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .take(cap)
        .collect()
}

/// Repair a model plan against the original query.
///
/// - unknown or missing intent becomes `semantic`
/// - dense weight is clamped to `[0, 1]` (missing or NaN takes the default)
/// - a semantic query under 10 characters is replaced by the original query,
///   one over 200 characters is truncated
/// - an empty keyword list becomes `[original]`
/// - keywords and synonyms are capped at 5 entries each
pub fn validate(response: PlanResponse, original: &str) -> RetrievalPlan {
    let intent = response
        .intent
        .as_deref()
        .and_then(Intent::parse)
        .unwrap_or(Intent::Semantic);

    let defaults = SearchStrategy::default();
    let strategy = response.strategy.unwrap_or_default();
    let dense_weight = strategy
        .dense_weight
        .filter(|w| !w.is_nan())
        .unwrap_or(defaults.dense_weight)
        .clamp(0.0, 1.0);

    let semantic_query = response.semantic_query.unwrap_or_default();
    let semantic_query = match semantic_query.trim().chars().count() {
        n if n < MIN_SEMANTIC_QUERY_CHARS => original.to_string(),
        n if n > MAX_SEMANTIC_QUERY_CHARS => semantic_query
            .trim()
            .chars()
            .take(MAX_SEMANTIC_QUERY_CHARS)
            .collect(),
        _ => semantic_query.trim().to_string(),
    };

    let mut keywords = clean_terms(response.keywords, MAX_KEYWORDS);
    if keywords.is_empty() {
        keywords.push(original.to_string());
    }

    let filters = response.filters.filter(|f| !f.is_empty());

    RetrievalPlan {
        intent,
        semantic_query,
        keywords,
        synonyms: clean_terms(response.synonyms, MAX_SYNONYMS),
        strategy: SearchStrategy {
            dense_weight,
            need_exact_match: strategy.need_exact_match.unwrap_or(false),
        },
        filters,
        reasoning: String::new(),
    }
}

/// Parse a complete (non-streamed) completion into a validated plan.
///
/// Fails if no complete JSON object is found or it does not deserialize.
pub fn plan_from_completion(content: &str, original: &str) -> Result<RetrievalPlan> {
    let mut parser = StreamParser::new();
    parser.feed(content);
    plan_from_parser(&parser, original)
}

/// Build a validated plan from a parser that has consumed a completion.
pub fn plan_from_parser(parser: &StreamParser, original: &str) -> Result<RetrievalPlan> {
    if !parser.is_complete() {
        return Err(EmomoError::Chat(
            "completion did not contain a complete JSON plan".into(),
        ));
    }

    let response: PlanResponse = serde_json::from_str(parser.json())?;
    let mut plan = validate(response, original);
    plan.reasoning = parser.thinking().trim().to_string();
    Ok(plan)
}
