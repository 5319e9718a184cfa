//! Local directory source.
//!
//! Lists every recognised image under a root folder. The first-level
//! sub-directory names the category; files directly under the root are
//! uncategorised. The listing is scanned once, sorted by relative path, and
//! paged with a decimal offset cursor.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{EmomoError, Result};
use crate::media::format::normalize_claimed;
use crate::traits::source::Source;
use crate::types::item::{FetchPage, MemeItem};

/// Default `source_type` of directory items.
pub const DEFAULT_SOURCE_ID: &str = "local";

/// Category of files directly under the root.
pub const UNCATEGORIZED: &str = "未分类";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// A source over a local folder tree.
pub struct DirectorySource {
    source_id: String,
    root: PathBuf,
    items: OnceCell<Vec<MemeItem>>,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            source_id: DEFAULT_SOURCE_ID.to_string(),
            root: root.into(),
            items: OnceCell::new(),
        }
    }

    /// Override the source identifier stored on produced memes.
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn items(&self) -> Result<&[MemeItem]> {
        let items = self.items.get_or_try_init(|| scan(&self.root)).await?;
        Ok(items.as_slice())
    }
}

#[async_trait]
impl Source for DirectorySource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch_batch(&self, cursor: Option<&str>, limit: usize) -> Result<FetchPage> {
        let items = self.items().await?;

        let offset = match cursor.filter(|c| !c.is_empty()) {
            Some(cursor) => cursor.parse::<usize>().map_err(|e| {
                EmomoError::Source(format!("invalid cursor {cursor:?}: {e}").into())
            })?,
            None => 0,
        };
        if offset >= items.len() {
            return Ok(FetchPage::exhausted());
        }

        let end = offset.saturating_add(limit).min(items.len());
        let next_cursor = (end < items.len()).then(|| end.to_string());
        debug!(root = %self.root.display(), offset, end, "directory batch");
        Ok(FetchPage::new(items[offset..end].to_vec(), next_cursor))
    }
}

async fn scan(root: &Path) -> Result<Vec<MemeItem>> {
    let metadata = tokio::fs::metadata(root).await.map_err(|e| {
        EmomoError::Source(format!("cannot read directory {}: {e}", root.display()).into())
    })?;
    if !metadata.is_dir() {
        return Err(EmomoError::Source(
            format!("not a directory: {}", root.display()).into(),
        ));
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    let mut items: Vec<MemeItem> = files
        .into_iter()
        .filter_map(|path| item_for(root, path))
        .collect();
    items.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    info!(root = %root.display(), items = items.len(), "scanned directory source");
    Ok(items)
}

fn item_for(root: &Path, path: PathBuf) -> Option<MemeItem> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return None;
    }
    let relative = path.strip_prefix(root).ok()?;

    let components: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let category = if components.len() > 1 {
        components[0].clone()
    } else {
        UNCATEGORIZED.to_string()
    };
    let source_id = components.join("/");
    let format = normalize_claimed(&extension);
    let is_animated = format == "gif";

    Some(
        MemeItem::from_path(source_id, path, format)
            .with_category(category)
            .with_animated(is_animated),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::item::ItemContent;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("熊猫头/nested")).unwrap();
        fs::create_dir_all(dir.path().join("猫咪")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("熊猫头/a.PNG"), b"png").unwrap();
        fs::write(dir.path().join("熊猫头/nested/b.jpg"), b"jpg").unwrap();
        fs::write(dir.path().join("猫咪/c.gif"), b"gif").unwrap();
        fs::write(dir.path().join("猫咪/notes.txt"), b"txt").unwrap();
        fs::write(dir.path().join("猫咪/.hidden.png"), b"png").unwrap();
        fs::write(dir.path().join(".git/d.png"), b"png").unwrap();
        fs::write(dir.path().join("root.webp"), b"webp").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_lists_images_with_categories() {
        let dir = fixture();
        let source = DirectorySource::new(dir.path());

        let page = source.fetch_batch(None, 100).await.unwrap();
        let ids: Vec<&str> = page.items.iter().map(|i| i.source_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["root.webp", "熊猫头/a.PNG", "熊猫头/nested/b.jpg", "猫咪/c.gif"]
        );
        assert!(page.next_cursor.is_none());

        let nested = &page.items[2];
        assert_eq!(nested.category, "熊猫头");
        assert_eq!(nested.format, "jpeg");
        assert!(matches!(&nested.content, ItemContent::Path(p) if p.ends_with("b.jpg")));

        assert_eq!(page.items[0].category, UNCATEGORIZED);
        assert_eq!(page.items[1].format, "png");
        assert!(page.items[3].is_animated);
        assert!(!page.items[1].is_animated);
    }

    #[tokio::test]
    async fn test_offset_cursor_pages() {
        let dir = fixture();
        let source = DirectorySource::new(dir.path()).with_source_id("chinesebqb");
        assert_eq!(source.source_id(), "chinesebqb");

        let first = source.fetch_batch(None, 3).await.unwrap();
        assert_eq!(first.items.len(), 3);
        assert_eq!(first.next_cursor.as_deref(), Some("3"));

        let second = source.fetch_batch(Some("3"), 3).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(second.next_cursor.is_none());

        let past = source.fetch_batch(Some("10"), 3).await.unwrap();
        assert!(past.items.is_empty());

        assert!(source.fetch_batch(Some("abc"), 3).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_root_is_source_error() {
        let source = DirectorySource::new("/definitely/not/here");
        assert!(matches!(
            source.fetch_batch(None, 10).await,
            Err(EmomoError::Source(_))
        ));
    }
}
