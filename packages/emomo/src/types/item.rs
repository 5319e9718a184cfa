//! Items produced by sources.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the bytes of an item live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemContent {
    /// Bytes already in memory
    Bytes(Vec<u8>),

    /// A file on local disk, read when the item is processed
    Path(PathBuf),
}

/// An image yielded by a source. Consumed once by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemeItem {
    /// Identifier unique within the source
    pub source_id: String,

    pub content: ItemContent,

    /// Claimed format, usually the file extension
    pub format: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub is_animated: bool,
}

impl MemeItem {
    /// Create an item backed by in-memory bytes.
    pub fn from_bytes(
        source_id: impl Into<String>,
        data: Vec<u8>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            content: ItemContent::Bytes(data),
            format: format.into(),
            category: String::new(),
            tags: Vec::new(),
            is_animated: false,
        }
    }

    /// Create an item backed by a local file.
    pub fn from_path(
        source_id: impl Into<String>,
        path: impl Into<PathBuf>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            content: ItemContent::Path(path.into()),
            format: format.into(),
            category: String::new(),
            tags: Vec::new(),
            is_animated: false,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(|t| t.into()).collect();
        self
    }

    pub fn with_animated(mut self, is_animated: bool) -> Self {
        self.is_animated = is_animated;
        self
    }
}

/// One page of a source listing.
#[derive(Debug, Clone, Default)]
pub struct FetchPage {
    pub items: Vec<MemeItem>,

    /// Cursor for the next page; `None` once the source is exhausted
    pub next_cursor: Option<String>,
}

impl FetchPage {
    pub fn new(items: Vec<MemeItem>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    /// An empty, final page.
    pub fn exhausted() -> Self {
        Self::default()
    }
}
