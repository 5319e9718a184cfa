//! In-memory storage implementation for testing and development.
//!
//! The repositories enforce the same uniqueness constraints as the
//! relational schema. Every store carries failure switches so tests can
//! drive the pipeline down its rollback and fallback paths.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{EmomoError, Result};
use crate::stores::StoreSet;
use crate::traits::object_store::ObjectStore;
use crate::traits::repository::{DescriptionRepository, MemeRepository, VectorRepository};
use crate::traits::vector_store::{
    cosine_similarity, reciprocal_rank_fusion, HybridSearchPlan, VectorStore,
};
use crate::types::meme::{Meme, MemeDescription, MemeStatus, MemeVector, VectorStatus};
use crate::types::search::{ScoredPoint, SearchFilters, VectorPayload};

/// A failure switch shared by a store and the test driving it.
#[derive(Debug, Default)]
struct FailSwitch(AtomicBool);

impl FailSwitch {
    fn set(&self, fail: bool) {
        self.0.store(fail, Ordering::SeqCst);
    }

    fn check(&self, make: impl FnOnce() -> EmomoError) -> Result<()> {
        if self.0.load(Ordering::SeqCst) {
            Err(make())
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Memes
// ============================================================================

/// Meme records keyed by id.
#[derive(Debug, Default)]
pub struct MemoryMemeRepository {
    memes: RwLock<HashMap<Uuid, Meme>>,
    fail_creates: FailSwitch,
    fail_lookups: FailSwitch,
}

impl MemoryMemeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.memes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.memes.read().is_empty()
    }

    /// Make `create` fail.
    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.set(fail);
    }

    /// Make `get_by_ids` fail.
    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.set(fail);
    }
}

#[async_trait]
impl MemeRepository for MemoryMemeRepository {
    async fn create(&self, meme: &Meme) -> Result<()> {
        self.fail_creates
            .check(|| EmomoError::repository("injected meme create failure"))?;

        let mut memes = self.memes.write();
        if memes.contains_key(&meme.id) {
            return Err(EmomoError::repository(format!("duplicate meme id: {}", meme.id)));
        }
        if memes.values().any(|m| m.content_hash == meme.content_hash) {
            return Err(EmomoError::repository(format!(
                "duplicate content hash: {}",
                meme.content_hash
            )));
        }
        if memes
            .values()
            .any(|m| m.source_type == meme.source_type && m.source_id == meme.source_id)
        {
            return Err(EmomoError::repository(format!(
                "duplicate source item: {}/{}",
                meme.source_type, meme.source_id
            )));
        }
        memes.insert(meme.id, meme.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Meme>> {
        Ok(self.memes.read().get(&id).cloned())
    }

    async fn get_by_hash(&self, content_hash: &str) -> Result<Option<Meme>> {
        Ok(self
            .memes
            .read()
            .values()
            .find(|m| m.content_hash == content_hash)
            .cloned())
    }

    async fn get_by_source(&self, source_type: &str, source_id: &str) -> Result<Option<Meme>> {
        Ok(self
            .memes
            .read()
            .values()
            .find(|m| m.source_type == source_type && m.source_id == source_id)
            .cloned())
    }

    async fn get_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Meme>> {
        self.fail_lookups
            .check(|| EmomoError::repository("injected meme lookup failure"))?;

        let memes = self.memes.read();
        Ok(ids.iter().filter_map(|id| memes.get(id).cloned()).collect())
    }

    async fn update(&self, meme: &Meme) -> Result<()> {
        let mut memes = self.memes.write();
        if !memes.contains_key(&meme.id) {
            return Err(EmomoError::not_found(format!("meme {}", meme.id)));
        }
        if memes
            .values()
            .any(|m| m.id != meme.id && m.content_hash == meme.content_hash)
        {
            return Err(EmomoError::repository(format!(
                "duplicate content hash: {}",
                meme.content_hash
            )));
        }
        memes.insert(meme.id, meme.clone());
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: MemeStatus) -> Result<()> {
        let mut memes = self.memes.write();
        let meme = memes
            .get_mut(&id)
            .ok_or_else(|| EmomoError::not_found(format!("meme {id}")))?;
        meme.status = status;
        meme.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.memes.write().remove(&id);
        Ok(())
    }

    async fn list_by_status(
        &self,
        status: MemeStatus,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Meme>> {
        let mut memes: Vec<Meme> = self
            .memes
            .read()
            .values()
            .filter(|m| m.status == status)
            .cloned()
            .collect();
        memes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(memes.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_active(
        &self,
        category: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Meme>> {
        let mut memes: Vec<Meme> = self
            .memes
            .read()
            .values()
            .filter(|m| m.is_active())
            .filter(|m| category.map_or(true, |c| m.category == c))
            .cloned()
            .collect();
        memes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(memes.into_iter().skip(offset).take(limit).collect())
    }

    async fn categories(&self) -> Result<Vec<String>> {
        let categories: BTreeSet<String> = self
            .memes
            .read()
            .values()
            .filter(|m| m.is_active() && !m.category.is_empty())
            .map(|m| m.category.clone())
            .collect();
        Ok(categories.into_iter().collect())
    }

    async fn count_by_status(&self, status: MemeStatus) -> Result<u64> {
        Ok(self
            .memes
            .read()
            .values()
            .filter(|m| m.status == status)
            .count() as u64)
    }
}

// ============================================================================
// Descriptions
// ============================================================================

/// Descriptions keyed by (content hash, model).
#[derive(Debug, Default)]
pub struct MemoryDescriptionRepository {
    descriptions: RwLock<HashMap<(String, String), MemeDescription>>,
}

impl MemoryDescriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.descriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.read().is_empty()
    }
}

#[async_trait]
impl DescriptionRepository for MemoryDescriptionRepository {
    async fn create(&self, description: &MemeDescription) -> Result<()> {
        let key = (description.content_hash.clone(), description.model.clone());
        let mut descriptions = self.descriptions.write();
        if descriptions.contains_key(&key) {
            return Err(EmomoError::repository(format!(
                "duplicate description: {}/{}",
                key.0, key.1
            )));
        }
        descriptions.insert(key, description.clone());
        Ok(())
    }

    async fn upsert(&self, description: &MemeDescription) -> Result<()> {
        let key = (description.content_hash.clone(), description.model.clone());
        self.descriptions.write().insert(key, description.clone());
        Ok(())
    }

    async fn get(&self, content_hash: &str, model: &str) -> Result<Option<MemeDescription>> {
        Ok(self
            .descriptions
            .read()
            .get(&(content_hash.to_string(), model.to_string()))
            .cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemeDescription>> {
        Ok(self
            .descriptions
            .read()
            .values()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.descriptions.write().retain(|_, d| d.id != id);
        Ok(())
    }
}

// ============================================================================
// Vector records
// ============================================================================

/// Vector tracking records keyed by (content hash, collection).
#[derive(Debug, Default)]
pub struct MemoryVectorRepository {
    vectors: RwLock<HashMap<(String, String), MemeVector>>,
    fail_writes: FailSwitch,
}

impl MemoryVectorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.read().is_empty()
    }

    /// Make `create` and `upsert` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }
}

#[async_trait]
impl VectorRepository for MemoryVectorRepository {
    async fn create(&self, vector: &MemeVector) -> Result<()> {
        self.fail_writes
            .check(|| EmomoError::repository("injected vector record failure"))?;

        let key = (vector.content_hash.clone(), vector.collection.clone());
        let mut vectors = self.vectors.write();
        if vectors.contains_key(&key) {
            return Err(EmomoError::repository(format!(
                "duplicate vector record: {}/{}",
                key.0, key.1
            )));
        }
        vectors.insert(key, vector.clone());
        Ok(())
    }

    async fn upsert(&self, vector: &MemeVector) -> Result<()> {
        self.fail_writes
            .check(|| EmomoError::repository("injected vector record failure"))?;

        let key = (vector.content_hash.clone(), vector.collection.clone());
        self.vectors.write().insert(key, vector.clone());
        Ok(())
    }

    async fn get(&self, content_hash: &str, collection: &str) -> Result<Option<MemeVector>> {
        Ok(self
            .vectors
            .read()
            .get(&(content_hash.to_string(), collection.to_string()))
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.vectors.write().retain(|_, v| v.id != id);
        Ok(())
    }

    async fn count_by_collection(&self, collection: &str) -> Result<u64> {
        Ok(self
            .vectors
            .read()
            .values()
            .filter(|v| v.collection == collection && v.status == VectorStatus::Active)
            .count() as u64)
    }
}

// ============================================================================
// Objects
// ============================================================================

/// Object storage held in memory.
#[derive(Debug)]
pub struct MemoryObjectStore {
    base_url: String,
    objects: RwLock<HashMap<String, (Vec<u8>, String)>>,
    fail_uploads: FailSwitch,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            base_url: "memory://emomo".to_string(),
            objects: RwLock::new(HashMap::new()),
            fail_uploads: FailSwitch::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Content type an object was uploaded with.
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().get(key).map(|(_, ct)| ct.clone())
    }

    /// Make `upload` fail.
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.set(fail);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.fail_uploads
            .check(|| EmomoError::object_store("injected upload failure"))?;
        self.objects
            .write()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| EmomoError::not_found(format!("object {key}")))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

// ============================================================================
// Vector index
// ============================================================================

#[derive(Debug, Clone)]
struct StoredPoint {
    vector: Vec<f32>,
    payload: VectorPayload,
}

/// A single vector collection held in memory.
///
/// Dense search ranks by cosine similarity. Lexical search scores term
/// overlap against each payload's `lexical_text`.
#[derive(Debug)]
pub struct MemoryVectorStore {
    collection: String,
    points: RwLock<HashMap<Uuid, StoredPoint>>,
    fail_upserts: FailSwitch,
    fail_hybrid: FailSwitch,
}

impl MemoryVectorStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            points: RwLock::new(HashMap::new()),
            fail_upserts: FailSwitch::default(),
            fail_hybrid: FailSwitch::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }

    pub fn payload(&self, point_id: Uuid) -> Option<VectorPayload> {
        self.points.read().get(&point_id).map(|p| p.payload.clone())
    }

    /// Make `upsert` fail.
    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.set(fail);
    }

    /// Make `hybrid_search` fail, leaving dense search working.
    pub fn fail_hybrid(&self, fail: bool) {
        self.fail_hybrid.set(fail);
    }

    fn dense(&self, vector: &[f32], limit: usize, filters: &SearchFilters) -> Vec<ScoredPoint> {
        let points = self.points.read();
        let mut scored: Vec<ScoredPoint> = points
            .iter()
            .filter(|(_, p)| filters.matches(&p.payload))
            .map(|(id, p)| ScoredPoint {
                point_id: *id,
                score: cosine_similarity(vector, &p.vector),
                payload: Some(p.payload.clone()),
            })
            .collect();
        sort_and_truncate(&mut scored, limit);
        scored
    }

    fn lexical(&self, query: &str, limit: usize, filters: &SearchFilters) -> Vec<ScoredPoint> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let points = self.points.read();
        let mut scored: Vec<ScoredPoint> = points
            .iter()
            .filter(|(_, p)| filters.matches(&p.payload))
            .filter_map(|(id, p)| {
                let text = p.payload.lexical_text.to_lowercase();
                let length = text.chars().count().max(1) as f32;
                let score: f32 = terms
                    .iter()
                    .map(|term| text.matches(term).count())
                    .filter(|count| *count > 0)
                    .map(|count| (1.0 + (count as f32).ln()) / (1.0 + length.ln()))
                    .sum();

                (score > 0.0).then(|| ScoredPoint {
                    point_id: *id,
                    score,
                    payload: Some(p.payload.clone()),
                })
            })
            .collect();
        sort_and_truncate(&mut scored, limit);
        scored
    }
}

fn sort_and_truncate(points: &mut Vec<ScoredPoint>, limit: usize) {
    points.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.point_id.cmp(&b.point_id))
    });
    points.truncate(limit);
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn upsert(&self, point_id: Uuid, vector: Vec<f32>, payload: VectorPayload) -> Result<()> {
        self.fail_upserts
            .check(|| EmomoError::vector_store("injected upsert failure"))?;
        self.points
            .write()
            .insert(point_id, StoredPoint { vector, payload });
        Ok(())
    }

    async fn delete(&self, point_id: Uuid) -> Result<()> {
        self.points.write().remove(&point_id);
        Ok(())
    }

    async fn dense_search(
        &self,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredPoint>> {
        Ok(self.dense(vector, limit, filters))
    }

    async fn hybrid_search(
        &self,
        vector: &[f32],
        lexical_query: &str,
        limit: usize,
        plan: &HybridSearchPlan,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredPoint>> {
        self.fail_hybrid
            .check(|| EmomoError::vector_store("injected hybrid search failure"))?;

        let mut legs = Vec::with_capacity(2);
        if plan.use_dense {
            legs.push(self.dense(vector, plan.dense_limit, filters));
        }
        if plan.use_lexical {
            legs.push(self.lexical(lexical_query, plan.lexical_limit, filters));
        }

        let mut fused = reciprocal_rank_fusion(&legs, plan.rrf_k);
        fused.truncate(limit);
        Ok(fused)
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// Concrete in-memory repositories and object store, kept typed so tests can
/// inspect them and flip failure switches.
#[derive(Debug, Clone, Default)]
pub struct MemoryStores {
    pub memes: Arc<MemoryMemeRepository>,
    pub descriptions: Arc<MemoryDescriptionRepository>,
    pub vectors: Arc<MemoryVectorRepository>,
    pub objects: Arc<MemoryObjectStore>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    /// The same stores behind trait objects.
    pub fn store_set(&self) -> StoreSet {
        StoreSet::new(
            self.memes.clone(),
            self.descriptions.clone(),
            self.vectors.clone(),
            self.objects.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(category: &str, lexical_text: &str) -> VectorPayload {
        VectorPayload {
            meme_id: Uuid::new_v4(),
            source_type: "local".into(),
            category: category.into(),
            is_animated: false,
            tags: Vec::new(),
            description: lexical_text.into(),
            storage_url: "memory://emomo/x".into(),
            lexical_text: lexical_text.into(),
        }
    }

    fn plan(dense_limit: usize, lexical_limit: usize) -> HybridSearchPlan {
        HybridSearchPlan {
            use_dense: true,
            use_lexical: true,
            dense_limit,
            lexical_limit,
            rrf_k: 60,
        }
    }

    #[tokio::test]
    async fn test_meme_uniqueness() {
        let repo = MemoryMemeRepository::new();
        let meme = Meme::new("local", "a.png", "hash1", "ha/hash1.png");
        repo.create(&meme).await.unwrap();

        let same_hash = Meme::new("local", "b.png", "hash1", "ha/hash1.png");
        assert!(repo.create(&same_hash).await.is_err());

        let same_source = Meme::new("local", "a.png", "hash2", "ha/hash2.png");
        assert!(repo.create(&same_source).await.is_err());

        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_list_active_filters_and_pages() {
        let repo = MemoryMemeRepository::new();
        for (i, category) in ["猫咪", "猫咪", "熊猫头"].iter().enumerate() {
            let meme = Meme::new("local", format!("{i}.png"), format!("h{i}"), format!("h{i}"))
                .with_category(*category);
            repo.create(&meme).await.unwrap();
            repo.update_status(meme.id, MemeStatus::Active).await.unwrap();
        }
        let pending = Meme::new("local", "p.png", "hp", "hp").with_category("狗");
        repo.create(&pending).await.unwrap();

        assert_eq!(repo.list_active(None, 10, 0).await.unwrap().len(), 3);
        assert_eq!(repo.list_active(Some("猫咪"), 10, 0).await.unwrap().len(), 2);
        assert_eq!(repo.list_active(None, 10, 2).await.unwrap().len(), 1);
        assert_eq!(repo.categories().await.unwrap(), vec!["熊猫头", "猫咪"]);
        assert_eq!(repo.count_by_status(MemeStatus::Pending).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_description_unique_per_model() {
        let repo = MemoryDescriptionRepository::new();
        repo.create(&MemeDescription::new("h", "m1", "a")).await.unwrap();
        repo.create(&MemeDescription::new("h", "m2", "b")).await.unwrap();
        assert!(repo.create(&MemeDescription::new("h", "m1", "c")).await.is_err());

        let existing = repo.get("h", "m1").await.unwrap().unwrap();
        repo.delete(existing.id).await.unwrap();
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_vector_record_unique_per_collection() {
        let repo = MemoryVectorRepository::new();
        let record = MemeVector::new(Uuid::new_v4(), "h", "emomo", "m", Uuid::new_v4());
        repo.create(&record).await.unwrap();
        assert!(repo.exists("h", "emomo").await.unwrap());
        assert!(!repo.exists("h", "other").await.unwrap());

        let again = MemeVector::new(Uuid::new_v4(), "h", "emomo", "m", Uuid::new_v4());
        assert!(repo.create(&again).await.is_err());
        assert_eq!(repo.count_by_collection("emomo").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_object_store_url_and_missing_download() {
        let store = MemoryObjectStore::new().with_base_url("https://cdn.example.com/");
        store.upload("ab/abc.png", vec![1, 2], "image/png").await.unwrap();

        assert_eq!(store.url("ab/abc.png"), "https://cdn.example.com/ab/abc.png");
        assert_eq!(store.content_type("ab/abc.png").as_deref(), Some("image/png"));
        assert!(matches!(
            store.download("missing").await,
            Err(EmomoError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_hybrid_fuses_both_legs() {
        let store = MemoryVectorStore::new("emomo");
        let dense_hit = Uuid::from_u128(1);
        let lexical_hit = Uuid::from_u128(2);
        store
            .upsert(dense_hit, vec![1.0, 0.0], payload("a", "完全无关"))
            .await
            .unwrap();
        store
            .upsert(lexical_hit, vec![0.0, 1.0], payload("a", "熊猫头 无语"))
            .await
            .unwrap();

        let results = store
            .hybrid_search(&[1.0, 0.0], "熊猫头", 10, &plan(1, 1), &SearchFilters::new())
            .await
            .unwrap();
        let ids: Vec<Uuid> = results.iter().map(|p| p.point_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&dense_hit) && ids.contains(&lexical_hit));
    }

    #[tokio::test]
    async fn test_filters_and_injected_failure() {
        let store = MemoryVectorStore::new("emomo");
        store
            .upsert(Uuid::from_u128(1), vec![1.0, 0.0], payload("猫咪", "cat"))
            .await
            .unwrap();
        store
            .upsert(Uuid::from_u128(2), vec![1.0, 0.0], payload("狗", "dog"))
            .await
            .unwrap();

        let filters = SearchFilters::new().with_category("猫咪");
        let results = store.dense_search(&[1.0, 0.0], 10, &filters).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].point_id, Uuid::from_u128(1));

        store.fail_hybrid(true);
        assert!(store
            .hybrid_search(&[1.0, 0.0], "cat", 10, &plan(5, 5), &filters)
            .await
            .is_err());
        assert!(store.dense_search(&[1.0, 0.0], 10, &filters).await.is_ok());
    }
}
