//! Search requests, responses and progress events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::plan::RetrievalPlan;

/// Payload stored alongside every vector point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
    pub meme_id: Uuid,
    pub source_type: String,
    pub category: String,
    pub is_animated: bool,

    #[serde(default)]
    pub tags: Vec<String>,

    pub description: String,
    pub storage_url: String,

    /// Text indexed by the lexical leg (description plus tags)
    #[serde(default)]
    pub lexical_text: String,
}

/// Filters applied to both search legs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_animated: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_animated(mut self, is_animated: bool) -> Self {
        self.is_animated = Some(is_animated);
        self
    }

    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    /// Fill the fields the caller left unset from a plan's suggestions.
    ///
    /// Caller-supplied values always win.
    pub fn merged_with_plan(&self, plan: &RetrievalPlan) -> SearchFilters {
        let mut merged = self.clone();
        if let Some(suggested) = &plan.filters {
            if merged.category.is_none() {
                merged.category = suggested.categories.first().cloned();
            }
            if merged.is_animated.is_none() {
                merged.is_animated = suggested.is_animated;
            }
        }
        merged
    }

    /// Whether a payload passes every set filter.
    pub fn matches(&self, payload: &VectorPayload) -> bool {
        if let Some(category) = &self.category {
            if &payload.category != category {
                return false;
            }
        }
        if let Some(is_animated) = self.is_animated {
            if payload.is_animated != is_animated {
                return false;
            }
        }
        if let Some(source_type) = &self.source_type {
            if &payload.source_type != source_type {
                return false;
            }
        }
        true
    }
}

/// A scored point returned by the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub point_id: Uuid,
    pub score: f32,
    pub payload: Option<VectorPayload>,
}

/// A text search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,

    /// Number of results; non-positive means the default
    #[serde(default)]
    pub top_k: i64,

    #[serde(default, flatten)]
    pub filters: SearchFilters,

    /// Named collection; `None` searches the default one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_top_k(mut self, top_k: i64) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: Uuid,
    pub url: String,
    pub score: f32,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub is_animated: bool,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub width: u32,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub height: u32,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Ranked results for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub query: String,

    /// Semantic query when it differs from the original
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_query: Option<String>,

    pub collection: String,
}

/// A page of memes in the same shape as search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemeListResponse {
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Named stage of a search with progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStage {
    QueryExpansionStart,
    Thinking,
    QueryExpansionDone,
    Embedding,
    Searching,
    Enriching,
    Complete,
    Error,
}

/// One event of a progress-reporting search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchProgress {
    pub stage: SearchStage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Incremental reasoning text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_text: Option<String>,

    #[serde(default)]
    pub is_delta: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_query: Option<String>,

    /// Final response, only on `Complete`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<SearchResponse>,
}

impl SearchProgress {
    pub fn stage(stage: SearchStage) -> Self {
        Self {
            stage,
            message: None,
            thinking_text: None,
            is_delta: false,
            expanded_query: None,
            response: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self {
            thinking_text: Some(text.into()),
            is_delta: true,
            ..Self::stage(SearchStage::Thinking)
        }
    }

    pub fn complete(response: SearchResponse) -> Self {
        Self {
            response: Some(response),
            ..Self::stage(SearchStage::Complete)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::stage(SearchStage::Error).with_message(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::plan::{Intent, PlanFilters};

    #[test]
    fn test_caller_filters_win_over_plan() {
        let plan = RetrievalPlan::new(Intent::Subject, "熊猫头", 0.5).with_filters(PlanFilters {
            categories: vec!["熊猫头".into()],
            is_animated: Some(true),
        });

        let caller = SearchFilters::new().with_category("猫咪");
        let merged = caller.merged_with_plan(&plan);
        assert_eq!(merged.category.as_deref(), Some("猫咪"));
        assert_eq!(merged.is_animated, Some(true));

        let merged = SearchFilters::new().merged_with_plan(&plan);
        assert_eq!(merged.category.as_deref(), Some("熊猫头"));
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&SearchStage::QueryExpansionStart).unwrap();
        assert_eq!(json, "\"query_expansion_start\"");
    }
}
