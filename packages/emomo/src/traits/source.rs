//! Source trait for pluggable image providers.
//!
//! A source is a paginated listing of images. The cursor is opaque to the
//! pipeline: it passes back whatever the previous page returned and stops
//! once a page carries no next cursor.
//!
//! ```rust,ignore
//! use emomo::traits::source::Source;
//!
//! let page = source.fetch_batch(None, 50).await?;
//! for item in page.items {
//!     println!("{}", item.source_id);
//! }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::types::item::FetchPage;

/// A paginated provider of meme items.
#[async_trait]
pub trait Source: Send + Sync {
    /// Stable identifier of this source type (e.g. "local").
    ///
    /// Stored as `source_type` on every meme the source produces.
    fn source_id(&self) -> &str;

    /// Fetch up to `limit` items starting at `cursor`.
    ///
    /// `None` starts from the beginning. An empty page or a page without a
    /// next cursor ends the listing.
    async fn fetch_batch(&self, cursor: Option<&str>, limit: usize) -> Result<FetchPage>;
}
