//! Vector index abstraction.
//!
//! One `VectorStore` instance is bound to one collection. Hybrid search
//! combines a dense (embedding) leg and a lexical (BM25-style) leg with
//! Reciprocal Rank Fusion; the fusion happens inside the store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::types::search::{ScoredPoint, SearchFilters, VectorPayload};

/// RRF constant (k=60) from the original RRF paper.
pub const DEFAULT_RRF_K: u32 = 60;

/// Prefetch sizes for each leg of a hybrid search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridSearchPlan {
    pub use_dense: bool,
    pub use_lexical: bool,
    pub dense_limit: usize,
    pub lexical_limit: usize,
    pub rrf_k: u32,
}

/// A vector collection.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Name of the collection this store writes to.
    fn collection(&self) -> &str;

    /// Insert or overwrite a point.
    async fn upsert(&self, point_id: Uuid, vector: Vec<f32>, payload: VectorPayload) -> Result<()>;

    /// Delete a point. Deleting a missing point is not an error.
    async fn delete(&self, point_id: Uuid) -> Result<()>;

    /// Nearest neighbours of `vector`, best first.
    async fn dense_search(
        &self,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredPoint>>;

    /// Dense and lexical legs fused with RRF, best first.
    async fn hybrid_search(
        &self,
        vector: &[f32],
        lexical_query: &str,
        limit: usize,
        plan: &HybridSearchPlan,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredPoint>>;
}

/// Reciprocal Rank Fusion for combining ranked point lists.
///
/// RRF score = sum(1 / (k + rank)) over every list the point appears in.
/// The payload of the first list that contains the point is kept.
pub fn reciprocal_rank_fusion(lists: &[Vec<ScoredPoint>], k: u32) -> Vec<ScoredPoint> {
    let k = k as f32;
    let mut scores: HashMap<Uuid, (f32, Option<VectorPayload>)> = HashMap::new();

    for list in lists {
        for (rank, point) in list.iter().enumerate() {
            let rrf_score = 1.0 / (k + rank as f32 + 1.0);
            scores
                .entry(point.point_id)
                .and_modify(|(s, _)| *s += rrf_score)
                .or_insert((rrf_score, point.payload.clone()));
        }
    }

    let mut combined: Vec<_> = scores
        .into_iter()
        .map(|(point_id, (score, payload))| ScoredPoint {
            point_id,
            score,
            payload,
        })
        .collect();

    combined.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.point_id.cmp(&b.point_id))
    });

    combined
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
