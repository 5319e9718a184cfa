//! Integration tests for search.
//!
//! A small corpus is ingested through the real pipeline, then searched:
//! 1. Query understanding (heuristic or streamed LLM)
//! 2. Hybrid search with dense fallback
//! 3. Enrichment from the meme repository
//! 4. Listing and corpus statistics

use std::sync::Arc;
use std::time::Duration;

use emomo::{
    media::content_hash,
    stores::{MemoryStores, MemoryVectorStore},
    testing::{png, MockChat, MockDescriber, MockEmbedder, VecSource},
    CollectionBinding, CollectionRegistry, EmomoError, IngestOptions, IngestPipeline, MemeItem,
    QueryUnderstandingConfig, QueryUnderstandingService, SearchConfig, SearchFilters,
    SearchOrchestrator, SearchProgress, SearchRequest, SearchStage,
};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const PLAN_JSON: &str = r#"{"intent":"emotion","semantic_query":"无语、无奈、嫌弃的情绪表情包，翻白眼的样子","keywords":["无语","无奈"],"synonyms":["翻白眼"],"strategy":{"dense_weight":0.8,"need_exact_match":false}}"#;

const CORPUS: &[(&str, &str, u8, &str)] = &[
    ("熊猫头/无语.png", "熊猫头", 1, "熊猫头翻白眼，一脸无语"),
    ("猫咪/开心.png", "猫咪", 2, "一只开心大笑的猫咪"),
    ("柴犬/得意.png", "柴犬", 3, "柴犬竖起大拇指，表情得意"),
];

struct Corpus {
    stores: MemoryStores,
    index: Arc<MemoryVectorStore>,
    binding: CollectionBinding,
}

/// Ingest the corpus into collection `emomo`.
async fn corpus() -> Corpus {
    let describer = CORPUS
        .iter()
        .fold(MockDescriber::new("vlm-a"), |describer, (_, _, seed, text)| {
            describer.with_description(content_hash(&png(8, 8, *seed)), *text)
        });
    let items: Vec<MemeItem> = CORPUS
        .iter()
        .map(|(id, category, seed, _)| {
            MemeItem::from_bytes(*id, png(8, 8, *seed), "png").with_category(*category)
        })
        .collect();

    let stores = MemoryStores::new();
    let index = Arc::new(MemoryVectorStore::new("emomo"));
    let binding = CollectionBinding::new(Arc::new(MockEmbedder::new("embed-small")), index.clone());
    let stats = IngestPipeline::new(stores.store_set(), Arc::new(describer), binding.clone())
        .ingest(
            Arc::new(VecSource::new("local", items)),
            100,
            IngestOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(stats.succeeded(), 3);

    Corpus {
        stores,
        index,
        binding,
    }
}

fn heuristic_search(corpus: &Corpus) -> SearchOrchestrator {
    SearchOrchestrator::new(
        corpus.stores.store_set(),
        CollectionRegistry::new(corpus.binding.clone()),
        Arc::new(QueryUnderstandingService::new(QueryUnderstandingConfig::default())),
    )
}

fn llm_search(corpus: &Corpus, chat: MockChat) -> SearchOrchestrator {
    let understanding = QueryUnderstandingService::new(
        QueryUnderstandingConfig::default().with_enabled(true),
    )
    .with_chat(Arc::new(chat));
    SearchOrchestrator::new(
        corpus.stores.store_set(),
        CollectionRegistry::new(corpus.binding.clone()),
        Arc::new(understanding),
    )
}

fn stages(events: &[SearchProgress]) -> Vec<SearchStage> {
    events.iter().map(|e| e.stage).collect()
}

#[tokio::test]
async fn test_keyword_match_ranks_first() {
    let corpus = corpus().await;
    let response = heuristic_search(&corpus)
        .search(&SearchRequest::new("无语"))
        .await
        .unwrap();

    assert!(!response.results.is_empty());
    assert_eq!(response.total, response.results.len());
    assert_eq!(response.results[0].category, "熊猫头");
    assert_eq!(response.results[0].description, "熊猫头翻白眼，一脸无语");
    assert_eq!((response.results[0].width, response.results[0].height), (8, 8));
    assert_eq!(response.collection, "emomo");
    assert_eq!(response.expanded_query, None);
}

#[tokio::test]
async fn test_subject_query_narrows_to_category() {
    let corpus = corpus().await;
    let response = heuristic_search(&corpus)
        .search(&SearchRequest::new("熊猫头"))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].category, "熊猫头");
}

#[tokio::test]
async fn test_caller_filter_overrides_suggested_category() {
    let corpus = corpus().await;
    let request = SearchRequest::new("熊猫头")
        .with_filters(SearchFilters::new().with_category("柴犬"));
    let response = heuristic_search(&corpus).search(&request).await.unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].category, "柴犬");
}

#[tokio::test]
async fn test_top_k_limits_results() {
    let corpus = corpus().await;
    let response = heuristic_search(&corpus)
        .search(&SearchRequest::new("表情").with_top_k(2))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 2);
}

#[tokio::test]
async fn test_hybrid_failure_falls_back_to_dense() {
    let corpus = corpus().await;
    corpus.index.fail_hybrid(true);

    let response = heuristic_search(&corpus)
        .search(&SearchRequest::new("无语"))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 3);
    let scores: Vec<f32> = response.results.iter().map(|r| r.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn test_dense_fallback_applies_threshold() {
    let corpus = corpus().await;
    corpus.index.fail_hybrid(true);
    let search = heuristic_search(&corpus).with_config(SearchConfig::default().with_score_threshold(0.5));

    let response = search.search(&SearchRequest::new("无语")).await.unwrap();

    assert!(response.results.iter().all(|r| r.score >= 0.5));
}

#[tokio::test]
async fn test_unknown_collection_is_an_error() {
    let corpus = corpus().await;
    let result = heuristic_search(&corpus)
        .search(&SearchRequest::new("无语").with_collection("nope"))
        .await;

    assert!(matches!(result, Err(EmomoError::UnknownCollection(name)) if name == "nope"));
}

#[tokio::test]
async fn test_named_collection_is_searched() {
    let corpus = corpus().await;
    let large = Arc::new(MemoryVectorStore::new("emomo-large"));
    let large_binding = CollectionBinding::new(Arc::new(MockEmbedder::new("embed-large")), large.clone());
    IngestPipeline::new(
        corpus.stores.store_set(),
        Arc::new(MockDescriber::new("vlm-a")),
        large_binding.clone(),
    )
    .ingest(
        Arc::new(VecSource::new(
            "local",
            CORPUS
                .iter()
                .map(|(id, _, seed, _)| MemeItem::from_bytes(*id, png(8, 8, *seed), "png"))
                .collect(),
        )),
        100,
        IngestOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let search = SearchOrchestrator::new(
        corpus.stores.store_set(),
        CollectionRegistry::new(corpus.binding.clone()).with_collection(large_binding),
        Arc::new(QueryUnderstandingService::new(QueryUnderstandingConfig::default())),
    );

    assert_eq!(search.available_collections(), vec!["emomo", "emomo-large"]);
    let response = search
        .search(&SearchRequest::new("无语").with_collection("emomo-large"))
        .await
        .unwrap();
    assert_eq!(response.collection, "emomo-large");
    assert_eq!(large.len(), 3);
    assert!(!response.results.is_empty());
}

#[tokio::test]
async fn test_enrichment_failure_keeps_results() {
    let corpus = corpus().await;
    corpus.stores.memes.fail_lookups(true);

    let response = heuristic_search(&corpus)
        .search(&SearchRequest::new("无语"))
        .await
        .unwrap();

    assert!(!response.results.is_empty());
    assert!(response.results.iter().all(|r| r.width == 0 && r.height == 0));
}

#[tokio::test]
async fn test_llm_plan_expands_query() {
    let corpus = corpus().await;
    let search = llm_search(&corpus, MockChat::new().with_completion(PLAN_JSON));

    let response = search.search(&SearchRequest::new("无语")).await.unwrap();

    assert_eq!(
        response.expanded_query.as_deref(),
        Some("无语、无奈、嫌弃的情绪表情包，翻白眼的样子")
    );
    assert_eq!(response.results[0].category, "熊猫头");
}

#[tokio::test]
async fn test_progress_without_llm() {
    let corpus = corpus().await;
    let search = heuristic_search(&corpus);

    let events: Vec<SearchProgress> = search
        .search_with_progress(SearchRequest::new("无语"))
        .collect()
        .await;

    assert_eq!(
        stages(&events),
        vec![
            SearchStage::Embedding,
            SearchStage::Searching,
            SearchStage::Enriching,
            SearchStage::Complete,
        ]
    );
    let response = events.last().and_then(|e| e.response.clone()).unwrap();
    assert_eq!(response.results[0].category, "熊猫头");
}

#[tokio::test]
async fn test_progress_streams_reasoning() {
    let corpus = corpus().await;
    let chat = MockChat::new()
        .with_completion(format!("<think>用户觉得无语，想要翻白眼的表情</think>{PLAN_JSON}"))
        .with_chunk_size(4);
    let search = llm_search(&corpus, chat);

    let events: Vec<SearchProgress> = search
        .search_with_progress(SearchRequest::new("无语"))
        .collect()
        .await;
    let stages = stages(&events);

    assert_eq!(stages.first(), Some(&SearchStage::QueryExpansionStart));
    assert_eq!(stages.last(), Some(&SearchStage::Complete));

    let thinking: Vec<&SearchProgress> = events
        .iter()
        .filter(|e| e.stage == SearchStage::Thinking)
        .collect();
    assert!(!thinking.is_empty());
    assert!(thinking.iter().all(|e| e.is_delta && e.thinking_text.is_some()));

    let position = |stage: SearchStage| stages.iter().position(|s| *s == stage).unwrap();
    assert!(position(SearchStage::Thinking) < position(SearchStage::QueryExpansionDone));
    assert!(position(SearchStage::QueryExpansionDone) < position(SearchStage::Embedding));
    assert!(position(SearchStage::Embedding) < position(SearchStage::Searching));
    assert!(position(SearchStage::Searching) < position(SearchStage::Complete));

    let done = &events[position(SearchStage::QueryExpansionDone)];
    assert_eq!(
        done.expanded_query.as_deref(),
        Some("无语、无奈、嫌弃的情绪表情包，翻白眼的样子")
    );
}

#[tokio::test]
async fn test_progress_llm_failure_still_completes() {
    let corpus = corpus().await;
    let search = llm_search(&corpus, MockChat::new().failing());

    let events: Vec<SearchProgress> = search
        .search_with_progress(SearchRequest::new("无语"))
        .collect()
        .await;
    let stages = stages(&events);

    assert_eq!(stages.first(), Some(&SearchStage::QueryExpansionStart));
    assert!(!stages.contains(&SearchStage::QueryExpansionDone));
    assert_eq!(stages.last(), Some(&SearchStage::Complete));
}

#[tokio::test]
async fn test_progress_unknown_collection_emits_error() {
    let corpus = corpus().await;
    let events: Vec<SearchProgress> = heuristic_search(&corpus)
        .search_with_progress(SearchRequest::new("无语").with_collection("nope"))
        .collect()
        .await;

    assert_eq!(stages(&events), vec![SearchStage::Error]);
    assert!(events[0].message.as_deref().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_progress_reports_fallback() {
    let corpus = corpus().await;
    corpus.index.fail_hybrid(true);

    let events: Vec<SearchProgress> = heuristic_search(&corpus)
        .search_with_progress(SearchRequest::new("无语"))
        .collect()
        .await;

    let searching = stages(&events)
        .iter()
        .filter(|s| **s == SearchStage::Searching)
        .count();
    assert_eq!(searching, 2);
    assert_eq!(events.last().map(|e| e.stage), Some(SearchStage::Complete));
}

#[tokio::test]
async fn test_cancelled_search() {
    let corpus = corpus().await;
    let search = llm_search(
        &corpus,
        MockChat::new()
            .with_completion(PLAN_JSON)
            .with_delay(Duration::from_secs(5)),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = search
        .search_with_cancel(&SearchRequest::new("无语"), cancel)
        .await;

    assert!(matches!(result, Err(EmomoError::Cancelled)));
}

#[tokio::test]
async fn test_list_memes_and_stats() {
    let corpus = corpus().await;
    let search = heuristic_search(&corpus);

    let page = search.list_memes(None, 2, 0).await.unwrap();
    assert_eq!(page.results.len(), 2);
    assert_eq!(page.limit, 2);

    let rest = search.list_memes(None, 2, 2).await.unwrap();
    assert_eq!(rest.results.len(), 1);

    let pandas = search.list_memes(Some("熊猫头"), 0, 0).await.unwrap();
    assert_eq!(pandas.limit, 20);
    assert_eq!(pandas.results.len(), 1);
    assert!(pandas.results[0].url.starts_with("memory://emomo/"));

    let stats = search.stats().await.unwrap();
    assert_eq!(stats.active_memes, 3);
    assert_eq!(stats.pending_memes, 0);
    assert_eq!(stats.categories.len(), 3);
    assert_eq!(stats.collections, vec!["emomo"]);
}

#[tokio::test]
async fn test_meme_lookup() {
    let corpus = corpus().await;
    let search = heuristic_search(&corpus);
    let id = search.list_memes(Some("柴犬"), 1, 0).await.unwrap().results[0].id;

    let meme = search.meme(id).await.unwrap();
    assert_eq!(meme.category, "柴犬");

    assert!(matches!(
        search.meme(Uuid::new_v4()).await,
        Err(EmomoError::NotFound { .. })
    ));
}
