//! Object storage for image bytes.

use async_trait::async_trait;

use crate::error::Result;

/// Blob storage addressed by key (S3, R2, local disk, memory).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous object.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    /// Read the full object.
    ///
    /// Returns `EmomoError::NotFound` if the key is absent.
    async fn download(&self, key: &str) -> Result<Vec<u8>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete the object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Public URL for the object.
    fn url(&self, key: &str) -> String;
}
