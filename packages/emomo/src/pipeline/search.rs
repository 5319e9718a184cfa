//! Search orchestration.
//!
//! query → plan → embedding → hybrid search (dense fallback) → enrichment.

use async_stream::stream;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SearchConfig;
use crate::error::{EmomoError, Result};
use crate::pipeline::hybrid::{build_hybrid_plan, build_lexical_query, DEFAULT_TOP_K};
use crate::pipeline::registry::CollectionRegistry;
use crate::pipeline::registry::CollectionBinding;
use crate::query::service::{QueryUnderstandingService, UnderstandProgress, UnderstandStage};
use crate::stores::StoreSet;
use crate::types::meme::{Meme, MemeStatus};
use crate::types::plan::RetrievalPlan;
use crate::types::search::{
    MemeListResponse, ScoredPoint, SearchFilters, SearchProgress, SearchRequest, SearchResponse,
    SearchResult, SearchStage,
};
use crate::types::stats::CorpusStats;

/// Upper bound on results per search.
pub const MAX_TOP_K: usize = 100;

pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;

const PROGRESS_BUFFER: usize = 100;

/// Result count for a requested `top_k`: default when non-positive, capped.
pub fn effective_top_k(top_k: i64) -> usize {
    if top_k <= 0 {
        DEFAULT_TOP_K
    } else {
        top_k.min(MAX_TOP_K as i64) as usize
    }
}

enum UnderstandStep {
    Event(UnderstandProgress),
    Done(RetrievalPlan),
}

/// Serves searches and corpus listings.
pub struct SearchOrchestrator {
    stores: StoreSet,
    registry: CollectionRegistry,
    understanding: Arc<QueryUnderstandingService>,
    config: SearchConfig,
}

impl SearchOrchestrator {
    pub fn new(
        stores: StoreSet,
        registry: CollectionRegistry,
        understanding: Arc<QueryUnderstandingService>,
    ) -> Self {
        Self {
            stores,
            registry,
            understanding,
            config: SearchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    pub fn available_collections(&self) -> Vec<String> {
        self.registry.available_collections()
    }

    /// Run a search.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let top_k = effective_top_k(request.top_k);
        let binding = self.registry.resolve(request.collection.as_deref())?;

        let plan = self.understanding.understand(&request.query).await;
        let semantic = semantic_query(&plan, &request.query);
        info!(
            query = %request.query,
            semantic_query = %semantic,
            intent = %plan.intent,
            top_k,
            collection = %binding.name(),
            "performing text search"
        );

        let embedding = binding.embedder().embed_query(semantic).await?;
        let filters = request.filters.merged_with_plan(&plan);

        let results = match self
            .hybrid(binding, &embedding, &plan, &filters, top_k)
            .await
        {
            Ok(points) => to_results(points, top_k, None),
            Err(e) => {
                warn!(query = %request.query, error = %e, "hybrid search failed, falling back to dense search");
                let points = binding.store().dense_search(&embedding, top_k, &filters).await?;
                to_results(points, top_k, Some(self.config.score_threshold))
            }
        };

        let results = self.enrich_dimensions(results).await;
        Ok(respond(request, &plan, binding, results))
    }

    /// Run a search, returning `Cancelled` if the token fires first.
    pub async fn search_with_cancel(
        &self,
        request: &SearchRequest,
        cancel: CancellationToken,
    ) -> Result<SearchResponse> {
        tokio::select! {
            result = self.search(request) => result,
            _ = cancel.cancelled() => Err(EmomoError::Cancelled),
        }
    }

    /// Run a search, yielding progress events.
    ///
    /// The stream ends with one `complete` event carrying the response or one
    /// `error` event.
    pub fn search_with_progress(
        &self,
        request: SearchRequest,
    ) -> Pin<Box<dyn Stream<Item = SearchProgress> + Send + '_>> {
        Box::pin(stream! {
            let top_k = effective_top_k(request.top_k);
            let binding = match self.registry.resolve(request.collection.as_deref()) {
                Ok(binding) => binding,
                Err(e) => {
                    yield SearchProgress::error(e.to_string());
                    return;
                }
            };

            let (tx, mut rx) = mpsc::channel(PROGRESS_BUFFER);
            let plan = {
                let understanding = self.understanding.understand_with_progress(&request.query, &tx);
                tokio::pin!(understanding);

                loop {
                    let step = tokio::select! {
                        plan = &mut understanding => UnderstandStep::Done(plan),
                        Some(event) = rx.recv() => UnderstandStep::Event(event),
                    };
                    match step {
                        UnderstandStep::Done(plan) => break plan,
                        UnderstandStep::Event(event) => {
                            if let Some(progress) = forward_understanding(event) {
                                yield progress;
                            }
                        }
                    }
                }
            };
            while let Ok(event) = rx.try_recv() {
                if let Some(progress) = forward_understanding(event) {
                    yield progress;
                }
            }

            let semantic = semantic_query(&plan, &request.query).to_string();
            if semantic != request.query {
                let mut done = SearchProgress::stage(SearchStage::QueryExpansionDone)
                    .with_message("query understood");
                done.expanded_query = Some(semantic.clone());
                yield done;
            }

            yield SearchProgress::stage(SearchStage::Embedding).with_message("embedding query");
            info!(
                query = %request.query,
                semantic_query = %semantic,
                intent = %plan.intent,
                top_k,
                collection = %binding.name(),
                "performing text search"
            );
            let embedding = match binding.embedder().embed_query(&semantic).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    yield SearchProgress::error(e.to_string());
                    return;
                }
            };

            yield SearchProgress::stage(SearchStage::Searching).with_message("searching");
            let filters = request.filters.merged_with_plan(&plan);
            let hybrid = self.hybrid(binding, &embedding, &plan, &filters, top_k).await;
            let results = match hybrid {
                Ok(points) => to_results(points, top_k, None),
                Err(e) => {
                    warn!(query = %request.query, error = %e, "hybrid search failed, falling back to dense search");
                    yield SearchProgress::stage(SearchStage::Searching)
                        .with_message("hybrid search failed, using dense search");
                    match binding.store().dense_search(&embedding, top_k, &filters).await {
                        Ok(points) => to_results(points, top_k, Some(self.config.score_threshold)),
                        Err(e) => {
                            yield SearchProgress::error(e.to_string());
                            return;
                        }
                    }
                }
            };

            let results = if results.is_empty() {
                results
            } else {
                yield SearchProgress::stage(SearchStage::Enriching).with_message("loading meme details");
                self.enrich_dimensions(results).await
            };

            yield SearchProgress::complete(respond(&request, &plan, binding, results));
        })
    }

    async fn hybrid(
        &self,
        binding: &CollectionBinding,
        embedding: &[f32],
        plan: &RetrievalPlan,
        filters: &SearchFilters,
        top_k: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let hybrid_plan = build_hybrid_plan(&plan.strategy, top_k as i64);
        let lexical_query = build_lexical_query(plan);
        debug!(
            lexical_query = %lexical_query,
            dense_limit = hybrid_plan.dense_limit,
            lexical_limit = hybrid_plan.lexical_limit,
            "hybrid search plan"
        );
        binding
            .store()
            .hybrid_search(embedding, &lexical_query, top_k, &hybrid_plan, filters)
            .await
    }

    /// Fill in dimensions from the meme repository. Lookup failure is
    /// logged and the results are returned as they are.
    async fn enrich_dimensions(&self, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        if results.is_empty() {
            return results;
        }

        let ids: Vec<Uuid> = results.iter().map(|r| r.id).collect();
        match self.stores.memes.get_by_ids(&ids).await {
            Ok(memes) => {
                let dimensions: HashMap<Uuid, (u32, u32)> = memes
                    .into_iter()
                    .map(|m| (m.id, (m.width, m.height)))
                    .collect();
                for result in &mut results {
                    if let Some(&(width, height)) = dimensions.get(&result.id) {
                        result.width = width;
                        result.height = height;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to enrich results from repository");
            }
        }
        results
    }

    /// Distinct categories of active memes.
    pub async fn categories(&self) -> Result<Vec<String>> {
        self.stores.memes.categories().await
    }

    pub async fn meme(&self, id: Uuid) -> Result<Meme> {
        self.stores
            .memes
            .get(id)
            .await?
            .ok_or_else(|| EmomoError::not_found(format!("meme {id}")))
    }

    /// Active memes, optionally in one category, shaped like search results.
    ///
    /// `limit` defaults to 20 when non-positive and is capped at 100.
    pub async fn list_memes(
        &self,
        category: Option<&str>,
        limit: i64,
        offset: usize,
    ) -> Result<MemeListResponse> {
        let limit = if limit <= 0 {
            DEFAULT_LIST_LIMIT
        } else {
            limit.min(MAX_LIST_LIMIT as i64) as usize
        };
        let category = category.filter(|c| !c.is_empty());

        let memes = self.stores.memes.list_active(category, limit, offset).await?;
        let results: Vec<SearchResult> = memes
            .into_iter()
            .map(|meme| SearchResult {
                id: meme.id,
                url: self.stores.objects.url(&meme.storage_key),
                score: 0.0,
                description: String::new(),
                category: meme.category,
                tags: meme.tags,
                is_animated: meme.is_animated,
                width: meme.width,
                height: meme.height,
            })
            .collect();

        Ok(MemeListResponse {
            total: results.len(),
            results,
            limit,
            offset,
        })
    }

    pub async fn stats(&self) -> Result<CorpusStats> {
        Ok(CorpusStats {
            active_memes: self.stores.memes.count_by_status(MemeStatus::Active).await?,
            pending_memes: self.stores.memes.count_by_status(MemeStatus::Pending).await?,
            categories: self.stores.memes.categories().await?,
            collections: self.registry.available_collections(),
        })
    }
}

fn semantic_query<'a>(plan: &'a RetrievalPlan, original: &'a str) -> &'a str {
    if plan.semantic_query.trim().is_empty() {
        original
    } else {
        &plan.semantic_query
    }
}

fn forward_understanding(event: UnderstandProgress) -> Option<SearchProgress> {
    match event.stage {
        UnderstandStage::ThinkingStart => {
            let progress = SearchProgress::stage(SearchStage::QueryExpansionStart);
            Some(match event.message {
                Some(message) => progress.with_message(message),
                None => progress,
            })
        }
        UnderstandStage::Thinking => event.thinking_text.map(SearchProgress::thinking),
        UnderstandStage::Done => None,
    }
}

/// Convert scored points into results. A positive threshold drops
/// lower-scored points.
fn to_results(points: Vec<ScoredPoint>, top_k: usize, threshold: Option<f32>) -> Vec<SearchResult> {
    let threshold = threshold.filter(|t| *t > 0.0);
    points
        .into_iter()
        .filter(|point| threshold.map_or(true, |t| point.score >= t))
        .filter_map(|point| {
            let payload = point.payload?;
            Some(SearchResult {
                id: payload.meme_id,
                url: payload.storage_url,
                score: point.score,
                description: payload.description,
                category: payload.category,
                tags: payload.tags,
                is_animated: payload.is_animated,
                width: 0,
                height: 0,
            })
        })
        .take(top_k)
        .collect()
}

fn respond(
    request: &SearchRequest,
    plan: &RetrievalPlan,
    binding: &CollectionBinding,
    results: Vec<SearchResult>,
) -> SearchResponse {
    let semantic = semantic_query(plan, &request.query);
    let expanded_query = (semantic != request.query).then(|| semantic.to_string());

    SearchResponse {
        total: results.len(),
        results,
        query: request.query.clone(),
        expanded_query,
        collection: binding.name().to_string(),
    }
}
