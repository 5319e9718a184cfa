//! Persisted records: memes, descriptions and vector tracking rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::EmomoError;

/// Lifecycle of a meme record.
///
/// `Pending` memes have stored content but no vector in at least one
/// collection they were ingested for; the retry path picks them up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemeStatus {
    Pending,
    Active,
    Failed,
}

impl MemeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemeStatus::Pending => "pending",
            MemeStatus::Active => "active",
            MemeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MemeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemeStatus {
    type Err = EmomoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MemeStatus::Pending),
            "active" => Ok(MemeStatus::Active),
            "failed" => Ok(MemeStatus::Failed),
            other => Err(EmomoError::repository(format!("unknown meme status: {other}"))),
        }
    }
}

/// Lifecycle of a vector tracking record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStatus {
    Active,
    Deleted,
}

impl VectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorStatus::Active => "active",
            VectorStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for VectorStatus {
    type Err = EmomoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(VectorStatus::Active),
            "deleted" => Ok(VectorStatus::Deleted),
            other => Err(EmomoError::repository(format!("unknown vector status: {other}"))),
        }
    }
}

/// A meme record. One per content hash, no matter how many sources
/// or collections reference the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meme {
    pub id: Uuid,

    /// Source that first produced this content (e.g. "local", "chinesebqb")
    pub source_type: String,

    /// Identifier of the item inside its source
    pub source_id: String,

    /// Lowercase hex MD5 of the normalized bytes
    pub content_hash: String,

    /// Object storage key, `<hash[0..2]>/<hash>.<ext>`
    pub storage_key: String,

    pub width: u32,
    pub height: u32,

    /// Stored format after normalization (e.g. "png")
    pub format: String,

    pub is_animated: bool,
    pub file_size: u64,
    pub category: String,

    #[serde(default)]
    pub tags: Vec<String>,

    pub status: MemeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Meme {
    /// Create a new pending meme with a fresh identity.
    pub fn new(
        source_type: impl Into<String>,
        source_id: impl Into<String>,
        content_hash: impl Into<String>,
        storage_key: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_type: source_type.into(),
            source_id: source_id.into(),
            content_hash: content_hash.into(),
            storage_key: storage_key.into(),
            width: 0,
            height: 0,
            format: String::new(),
            is_animated: false,
            file_size: 0,
            category: String::new(),
            tags: Vec::new(),
            status: MemeStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_animated(mut self, is_animated: bool) -> Self {
        self.is_animated = is_animated;
        self
    }

    pub fn with_file_size(mut self, file_size: u64) -> Self {
        self.file_size = file_size;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == MemeStatus::Active
    }
}

/// Generated description of one piece of content by one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemeDescription {
    pub id: Uuid,
    pub content_hash: String,

    /// Vision-language model that produced the text
    pub model: String,

    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl MemeDescription {
    pub fn new(
        content_hash: impl Into<String>,
        model: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_hash: content_hash.into(),
            model: model.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

/// Tracks the vector of one piece of content in one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemeVector {
    pub id: Uuid,
    pub meme_id: Uuid,
    pub content_hash: String,
    pub collection: String,
    pub embedding_model: String,
    pub description_id: Option<Uuid>,

    /// Point ID inside the vector index, distinct from the meme identity
    pub vector_point_id: Uuid,

    pub status: VectorStatus,
    pub created_at: DateTime<Utc>,
}

impl MemeVector {
    pub fn new(
        meme_id: Uuid,
        content_hash: impl Into<String>,
        collection: impl Into<String>,
        embedding_model: impl Into<String>,
        vector_point_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            meme_id,
            content_hash: content_hash.into(),
            collection: collection.into(),
            embedding_model: embedding_model.into(),
            description_id: None,
            vector_point_id,
            status: VectorStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description_id: Uuid) -> Self {
        self.description_id = Some(description_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_meme_is_pending() {
        let meme = Meme::new("local", "a/b.png", "abcdef", "ab/abcdef.png");
        assert_eq!(meme.status, MemeStatus::Pending);
        assert!(!meme.is_active());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [MemeStatus::Pending, MemeStatus::Active, MemeStatus::Failed] {
            assert_eq!(status.as_str().parse::<MemeStatus>().unwrap(), status);
        }
        assert!("archived".parse::<MemeStatus>().is_err());
    }
}
