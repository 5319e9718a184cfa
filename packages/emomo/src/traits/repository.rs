//! Relational repositories for memes, descriptions and vector tracking.
//!
//! The storage layer is split into focused traits, one per table:
//! - `MemeRepository`: one record per content hash
//! - `DescriptionRepository`: one record per (content hash, model)
//! - `VectorRepository`: one record per (content hash, collection)
//!
//! Implementations must enforce those uniqueness constraints: creating a
//! second record for the same key is an error, not a silent overwrite.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::meme::{Meme, MemeDescription, MemeStatus, MemeVector};

/// Meme records.
#[async_trait]
pub trait MemeRepository: Send + Sync {
    /// Insert a new meme. Fails if the content hash or the
    /// (source type, source id) pair is already taken.
    async fn create(&self, meme: &Meme) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Meme>>;

    async fn get_by_hash(&self, content_hash: &str) -> Result<Option<Meme>>;

    async fn get_by_source(&self, source_type: &str, source_id: &str) -> Result<Option<Meme>>;

    /// Batch lookup. Missing ids are left out of the result.
    async fn get_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Meme>>;

    async fn exists_by_hash(&self, content_hash: &str) -> Result<bool> {
        Ok(self.get_by_hash(content_hash).await?.is_some())
    }

    /// Replace every field of an existing meme. Fails with `NotFound` when
    /// the id is unknown, and like `create` when the new content hash
    /// belongs to another record.
    async fn update(&self, meme: &Meme) -> Result<()>;

    async fn update_status(&self, id: Uuid, status: MemeStatus) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    async fn list_by_status(&self, status: MemeStatus, limit: usize, offset: usize)
        -> Result<Vec<Meme>>;

    /// Active memes, newest first, optionally narrowed to one category.
    async fn list_active(
        &self,
        category: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Meme>>;

    /// Distinct categories of active memes, sorted.
    async fn categories(&self) -> Result<Vec<String>>;

    async fn count_by_status(&self, status: MemeStatus) -> Result<u64>;
}

/// Generated descriptions.
#[async_trait]
pub trait DescriptionRepository: Send + Sync {
    /// Insert a description. Fails if (hash, model) already exists.
    async fn create(&self, description: &MemeDescription) -> Result<()>;

    /// Insert or replace the description for (hash, model).
    async fn upsert(&self, description: &MemeDescription) -> Result<()>;

    async fn get(&self, content_hash: &str, model: &str) -> Result<Option<MemeDescription>>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemeDescription>>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Vector tracking records.
#[async_trait]
pub trait VectorRepository: Send + Sync {
    /// Insert a record. Fails if (hash, collection) already exists.
    async fn create(&self, vector: &MemeVector) -> Result<()>;

    /// Insert or replace the record for (hash, collection).
    async fn upsert(&self, vector: &MemeVector) -> Result<()>;

    async fn get(&self, content_hash: &str, collection: &str) -> Result<Option<MemeVector>>;

    /// Whether an active vector exists for (hash, collection).
    async fn exists(&self, content_hash: &str, collection: &str) -> Result<bool> {
        Ok(self
            .get(content_hash, collection)
            .await?
            .is_some_and(|v| v.status == crate::types::meme::VectorStatus::Active))
    }

    async fn delete(&self, id: Uuid) -> Result<()>;

    async fn count_by_collection(&self, collection: &str) -> Result<u64>;
}
