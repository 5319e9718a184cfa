//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use emomo without making
//! real model or network calls. Every double counts its calls and can be
//! switched into a failing mode.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{EmomoError, Result};
use crate::media::identity::content_hash;
use crate::traits::ai::{
    ChatProvider, ChatRequest, DescriptionProvider, EmbeddingProvider, TokenStream,
};
use crate::traits::source::Source;
use crate::types::item::{FetchPage, MemeItem};
use crate::types::search::VectorPayload;

/// Dimension of [`MockEmbedder`] vectors.
pub const MOCK_EMBEDDING_DIM: usize = 64;

// ============================================================================
// Chat
// ============================================================================

/// A mock chat provider returning one canned completion.
///
/// `stream` yields the completion in fixed-size character chunks.
#[derive(Debug)]
pub struct MockChat {
    completion: String,
    chunk_size: usize,
    delay: Option<Duration>,
    failing: bool,
    calls: AtomicUsize,
}

impl Default for MockChat {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChat {
    pub fn new() -> Self {
        Self {
            completion: String::new(),
            chunk_size: 8,
            delay: None,
            failing: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_completion(mut self, completion: impl Into<String>) -> Self {
        self.completion = completion.into();
        self
    }

    /// Characters per streamed token.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with a transport error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn begin(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(EmomoError::Chat("mock chat failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatProvider for MockChat {
    async fn complete(&self, _request: ChatRequest) -> Result<String> {
        self.begin().await?;
        Ok(self.completion.clone())
    }

    async fn stream(&self, _request: ChatRequest) -> Result<TokenStream> {
        self.begin().await?;

        let chars: Vec<char> = self.completion.chars().collect();
        let chunks: Vec<Result<String>> = chars
            .chunks(self.chunk_size)
            .map(|chunk| Ok(chunk.iter().collect()))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

// ============================================================================
// Embeddings
// ============================================================================

/// A deterministic embedder.
///
/// Each character is hashed into one of [`MOCK_EMBEDDING_DIM`] buckets, so
/// texts sharing characters land close together.
#[derive(Debug)]
pub struct MockEmbedder {
    model: String,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Switch failure mode on or off.
    pub fn fail(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The vector `embed` returns for `text`.
    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; MOCK_EMBEDDING_DIM];
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            let bucket = (c as u32).wrapping_mul(2_654_435_761) as usize % MOCK_EMBEDDING_DIM;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmomoError::Embedding("mock embedding failure".into()));
        }
        Ok(Self::vector_for(text))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Descriptions
// ============================================================================

/// A mock vision model.
///
/// Returns a configured description per content hash, or a generic one.
#[derive(Debug)]
pub struct MockDescriber {
    model: String,
    descriptions: RwLock<HashMap<String, String>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockDescriber {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            descriptions: RwLock::new(HashMap::new()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Describe the image with this content hash as `text`.
    pub fn with_description(self, content_hash: impl Into<String>, text: impl Into<String>) -> Self {
        self.descriptions
            .write()
            .insert(content_hash.into(), text.into());
        self
    }

    /// Switch failure mode on or off.
    pub fn fail(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DescriptionProvider for MockDescriber {
    async fn describe(&self, image: &[u8], format: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmomoError::Description("mock description failure".into()));
        }

        let hash = content_hash(image);
        Ok(self
            .descriptions
            .read()
            .get(&hash)
            .cloned()
            .unwrap_or_else(|| format!("一张{format}格式的表情包 {}", &hash[..8])))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Sources
// ============================================================================

/// A source over a fixed list of items. The cursor is a decimal offset.
#[derive(Debug)]
pub struct VecSource {
    source_id: String,
    items: Vec<MemeItem>,
    fail_at: Option<usize>,
    fetches: AtomicUsize,
}

impl VecSource {
    pub fn new(source_id: impl Into<String>, items: Vec<MemeItem>) -> Self {
        Self {
            source_id: source_id.into(),
            items,
            fail_at: None,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Fail any fetch starting at or past `offset`.
    pub fn failing_at(mut self, offset: usize) -> Self {
        self.fail_at = Some(offset);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for VecSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch_batch(&self, cursor: Option<&str>, limit: usize) -> Result<FetchPage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let offset = match cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|e| EmomoError::Source(Box::new(e)))?,
            None => 0,
        };
        if self.fail_at.is_some_and(|at| offset >= at) {
            return Err(EmomoError::Source("mock source failure".into()));
        }
        if offset >= self.items.len() {
            return Ok(FetchPage::exhausted());
        }

        let end = (offset + limit).min(self.items.len());
        let next_cursor = (end < self.items.len()).then(|| end.to_string());
        Ok(FetchPage::new(self.items[offset..end].to_vec(), next_cursor))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A solid-colour PNG. Different `seed`s give different bytes.
pub fn png(width: u32, height: u32, seed: u8) -> Vec<u8> {
    encode(width, height, seed, image::ImageFormat::Png)
}

/// A solid-colour single-frame GIF.
pub fn gif(width: u32, height: u32, seed: u8) -> Vec<u8> {
    encode(width, height, seed, image::ImageFormat::Gif)
}

fn encode(width: u32, height: u32, seed: u8, format: image::ImageFormat) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([seed, 255 - seed, 64, 255]));
    let mut out = Cursor::new(Vec::new());
    match image::DynamicImage::ImageRgba8(img).write_to(&mut out, format) {
        Ok(()) => out.into_inner(),
        Err(_) => Vec::new(),
    }
}

/// A vector payload in `category` with itself as description and lexical text.
pub fn payload(category: &str) -> VectorPayload {
    VectorPayload {
        meme_id: Uuid::new_v4(),
        source_type: "local".to_string(),
        category: category.to_string(),
        is_animated: false,
        tags: Vec::new(),
        description: category.to_string(),
        storage_url: format!("memory://emomo/{category}"),
        lexical_text: category.to_string(),
    }
}
