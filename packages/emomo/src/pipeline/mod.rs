//! Ingestion and search pipelines.
//!
//! - Ingest: source → normalize → dedup → describe → embed → store
//! - Retry: re-enrich memes left pending by a failed run
//! - Search: query understanding → hybrid search → enrichment
//! - Registry: named collections, each tied to one embedding model

pub mod hybrid;
pub mod ingest;
pub mod registry;
pub mod retry;
pub mod search;
pub mod text;

pub use hybrid::{build_hybrid_plan, build_lexical_query, DEFAULT_TOP_K, MAX_PREFETCH};
pub use ingest::IngestPipeline;
pub use registry::{CollectionBinding, CollectionRegistry};
pub use search::{effective_top_k, SearchOrchestrator, MAX_TOP_K};
pub use text::{embedding_text, lexical_text};
