//! Query understanding service.
//!
//! Turns a free-text query into a [`RetrievalPlan`]. With a chat provider
//! configured and enabled, short queries go through the LLM (blocking or
//! streamed) and the validated result is cached. Every failure on that path
//! falls back to the heuristic plan; callers never see an error.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::QueryUnderstandingConfig;
use crate::error::{EmomoError, Result};
use crate::query::cache::PlanCache;
use crate::query::heuristics::heuristic_plan;
use crate::query::parser::StreamParser;
use crate::query::prompts::QUERY_UNDERSTANDING_PROMPT;
use crate::query::validate::{plan_from_completion, plan_from_parser};
use crate::traits::ai::{ChatProvider, ChatRequest};
use crate::types::plan::RetrievalPlan;

/// Stage of a streamed understanding call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderstandStage {
    ThinkingStart,
    Thinking,
    Done,
}

/// Progress event of a streamed understanding call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderstandProgress {
    pub stage: UnderstandStage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_text: Option<String>,

    #[serde(default)]
    pub is_delta: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UnderstandProgress {
    fn stage(stage: UnderstandStage, message: &str) -> Self {
        Self {
            stage,
            thinking_text: None,
            is_delta: false,
            message: Some(message.to_string()),
        }
    }

    fn thinking(text: String) -> Self {
        Self {
            stage: UnderstandStage::Thinking,
            thinking_text: Some(text),
            is_delta: true,
            message: None,
        }
    }
}

/// Produces retrieval plans. Holds the only cross-request mutable state
/// (the plan cache).
pub struct QueryUnderstandingService {
    chat: Option<Arc<dyn ChatProvider>>,
    config: QueryUnderstandingConfig,
    cache: PlanCache,
}

impl QueryUnderstandingService {
    /// Heuristic-only service.
    pub fn new(config: QueryUnderstandingConfig) -> Self {
        let cache = PlanCache::new(config.cache_size, config.cache_ttl);
        Self {
            chat: None,
            config,
            cache,
        }
    }

    /// Attach the chat provider used by the LLM path.
    pub fn with_chat(mut self, chat: Arc<dyn ChatProvider>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Whether the LLM path can be used.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.chat.is_some()
    }

    pub fn cache(&self) -> &PlanCache {
        &self.cache
    }

    fn llm_for(&self, query: &str) -> Option<&Arc<dyn ChatProvider>> {
        if !self.config.enabled {
            return None;
        }
        if query.chars().count() > self.config.max_query_chars {
            debug!(query, "query too long for LLM understanding, using heuristics");
            return None;
        }
        self.chat.as_ref()
    }

    fn request(&self, query: &str) -> ChatRequest {
        ChatRequest::new(QUERY_UNDERSTANDING_PROMPT, query)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature)
    }

    /// Understand a query with a single blocking completion.
    pub async fn understand(&self, query: &str) -> RetrievalPlan {
        if !self.config.enabled {
            return heuristic_plan(query);
        }
        if let Some(plan) = self.cache.get(query) {
            debug!(query, intent = %plan.intent, "plan cache hit");
            return plan;
        }
        let Some(chat) = self.llm_for(query) else {
            return heuristic_plan(query);
        };

        let call = async {
            let content = chat.complete(self.request(query)).await?;
            plan_from_completion(&content, query)
        };

        match self.with_timeout(call).await {
            Ok(plan) => {
                debug!(query, intent = %plan.intent, "LLM plan");
                self.cache.insert(query, plan.clone());
                plan
            }
            Err(e) => {
                warn!(query, error = %e, "query understanding failed, using heuristics");
                heuristic_plan(query)
            }
        }
    }

    /// Understand a query with a streamed completion, reporting reasoning
    /// text as it arrives.
    ///
    /// Progress is best-effort: a closed receiver does not abort the call.
    pub async fn understand_with_progress(
        &self,
        query: &str,
        progress: &mpsc::Sender<UnderstandProgress>,
    ) -> RetrievalPlan {
        if !self.config.enabled {
            return heuristic_plan(query);
        }
        if let Some(plan) = self.cache.get(query) {
            debug!(query, intent = %plan.intent, "plan cache hit");
            let _ = progress
                .send(UnderstandProgress::stage(UnderstandStage::Done, "cached"))
                .await;
            return plan;
        }
        let Some(chat) = self.llm_for(query) else {
            return heuristic_plan(query);
        };

        let _ = progress
            .send(UnderstandProgress::stage(
                UnderstandStage::ThinkingStart,
                "understanding query",
            ))
            .await;

        let plan = match self
            .with_timeout(self.stream_plan(chat.as_ref(), query, progress))
            .await
        {
            Ok(plan) => {
                debug!(query, intent = %plan.intent, "streamed LLM plan");
                self.cache.insert(query, plan.clone());
                plan
            }
            Err(e) => {
                warn!(query, error = %e, "streamed query understanding failed, using heuristics");
                heuristic_plan(query)
            }
        };

        let _ = progress
            .send(UnderstandProgress::stage(UnderstandStage::Done, "done"))
            .await;
        plan
    }

    async fn stream_plan(
        &self,
        chat: &dyn ChatProvider,
        query: &str,
        progress: &mpsc::Sender<UnderstandProgress>,
    ) -> Result<RetrievalPlan> {
        let mut tokens = chat.stream(self.request(query)).await?;
        let mut parser = StreamParser::new();

        while let Some(token) = tokens.next().await {
            let (thinking, complete) = parser.feed(&token?);
            if !thinking.is_empty() {
                let _ = progress.send(UnderstandProgress::thinking(thinking)).await;
            }
            if complete {
                break;
            }
        }

        plan_from_parser(&parser, query)
    }

    async fn with_timeout<F>(&self, call: F) -> Result<RetrievalPlan>
    where
        F: std::future::Future<Output = Result<RetrievalPlan>>,
    {
        tokio::time::timeout(self.config.timeout, call)
            .await
            .map_err(|_| EmomoError::Chat("query understanding timed out".into()))?
    }
}
