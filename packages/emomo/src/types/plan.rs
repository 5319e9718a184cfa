//! Retrieval plans produced by query understanding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the user is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// A feeling (无语, 开心, emo)
    Emotion,
    /// Internet slang (芭比Q, 绝绝子)
    Meme,
    /// A character or subject (熊猫头, 猫咪)
    Subject,
    /// A usage scene (上班, 恋爱)
    Scene,
    /// An action (比心, 翻白眼)
    Action,
    /// Text printed on the image (有666的)
    Text,
    /// Subject plus emotion (熊猫头无语)
    Composite,
    /// Generic fallback
    Semantic,
}

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::Emotion,
        Intent::Meme,
        Intent::Subject,
        Intent::Scene,
        Intent::Action,
        Intent::Text,
        Intent::Composite,
        Intent::Semantic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Emotion => "emotion",
            Intent::Meme => "meme",
            Intent::Subject => "subject",
            Intent::Scene => "scene",
            Intent::Action => "action",
            Intent::Text => "text",
            Intent::Composite => "composite",
            Intent::Semantic => "semantic",
        }
    }

    /// Parse an intent name, returning `None` for anything unrecognised.
    pub fn parse(name: &str) -> Option<Intent> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Balance between the dense and lexical legs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchStrategy {
    /// 0 = lexical only, 1 = dense only
    pub dense_weight: f32,

    /// Literal matching matters (short queries, quoted text)
    pub need_exact_match: bool,
}

impl Default for SearchStrategy {
    fn default() -> Self {
        Self {
            dense_weight: 0.7,
            need_exact_match: false,
        }
    }
}

/// Filters a plan suggests. Callers may override them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_animated: Option<bool>,
}

impl PlanFilters {
    pub fn for_category(category: impl Into<String>) -> Self {
        Self {
            categories: vec![category.into()],
            is_animated: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.is_animated.is_none()
    }
}

/// Structured output of query understanding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPlan {
    pub intent: Intent,
    pub semantic_query: String,
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,

    pub strategy: SearchStrategy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<PlanFilters>,

    /// Model reasoning, kept for debugging only
    #[serde(skip)]
    pub reasoning: String,
}

impl RetrievalPlan {
    /// A plan that searches for the query as-is.
    pub fn new(intent: Intent, query: impl Into<String>, dense_weight: f32) -> Self {
        let query = query.into();
        Self {
            intent,
            semantic_query: query.clone(),
            keywords: vec![query],
            synonyms: Vec::new(),
            strategy: SearchStrategy {
                dense_weight,
                need_exact_match: false,
            },
            filters: None,
            reasoning: String::new(),
        }
    }

    pub fn with_exact_match(mut self, need_exact_match: bool) -> Self {
        self.strategy.need_exact_match = need_exact_match;
        self
    }

    pub fn with_filters(mut self, filters: PlanFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// First category the plan suggests, if any.
    pub fn suggested_category(&self) -> Option<&str> {
        self.filters
            .as_ref()
            .and_then(|f| f.categories.first())
            .map(String::as_str)
    }
}
