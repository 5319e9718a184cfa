//! Meme Ingestion and Hybrid Search Library
//!
//! Ingests meme images from pluggable sources, describes them with a
//! vision-language model, embeds the descriptions into named vector
//! collections and serves natural-language search over them.
//!
//! # Design Philosophy
//!
//! - One meme per content hash, no matter how many sources produce it
//! - One vector per (content hash, collection), reusing descriptions across models
//! - Every failure after the first write is compensated, never half-applied
//! - Query understanding degrades to rules, hybrid search degrades to dense
//! - Library handles mechanics, app picks the providers and stores
//!
//! # Usage
//!
//! ```rust,ignore
//! use emomo::{CollectionBinding, CollectionRegistry, IngestPipeline, SearchOrchestrator};
//! use emomo::sources::DirectorySource;
//! use emomo::stores::MemoryStores;
//!
//! let stores = MemoryStores::default().store_set();
//! let binding = CollectionBinding::new(embedder, vector_store);
//! let pipeline = IngestPipeline::new(stores.clone(), describer, binding.clone());
//!
//! let source = Arc::new(DirectorySource::new("./memes"));
//! let stats = pipeline.ingest(source, 100, IngestOptions::default(), cancel).await?;
//!
//! let understanding = Arc::new(QueryUnderstandingService::new(config.query_understanding));
//! let search = SearchOrchestrator::new(stores, CollectionRegistry::new(binding), understanding);
//! let response = search.search(&SearchRequest::new("无语的熊猫头")).await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator abstractions (sources, stores, AI providers)
//! - [`types`] - Records, plans, requests and progress events
//! - [`media`] - Format detection, first-frame conversion, content identity
//! - [`query`] - Query understanding with streaming and heuristic fallback
//! - [`pipeline`] - Ingestion, retry and search orchestration
//! - [`stores`] - In-memory and PostgreSQL implementations
//! - [`sources`] - Local directory source
//! - [`testing`] - Mock providers and fixtures

pub mod ai;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod query;
pub mod sources;
pub mod stores;
pub mod telemetry;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use config::{Config, IngestConfig, QueryUnderstandingConfig, SearchConfig};
pub use error::{EmomoError, Result};
pub use pipeline::{CollectionBinding, CollectionRegistry, IngestPipeline, SearchOrchestrator};
pub use query::{PlanCache, QueryUnderstandingService};
pub use stores::StoreSet;
pub use traits::{
    ai::{ChatProvider, ChatRequest, DescriptionProvider, EmbeddingProvider, TokenStream},
    object_store::ObjectStore,
    repository::{DescriptionRepository, MemeRepository, VectorRepository},
    source::Source,
    vector_store::{HybridSearchPlan, VectorStore},
};
pub use types::{
    item::{FetchPage, ItemContent, MemeItem},
    meme::{Meme, MemeDescription, MemeStatus, MemeVector, VectorStatus},
    plan::{Intent, PlanFilters, RetrievalPlan, SearchStrategy},
    search::{
        MemeListResponse, ScoredPoint, SearchFilters, SearchProgress, SearchRequest,
        SearchResponse, SearchResult, SearchStage, VectorPayload,
    },
    stats::{CorpusStats, IngestOptions, IngestStats},
};
