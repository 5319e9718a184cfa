//! AI provider traits.
//!
//! Three narrow capabilities back the pipeline and the search engine:
//! - Description of an image by a vision-language model
//! - Text embedding (documents and queries)
//! - Chat completion, blocking or token-streamed
//!
//! Implementations wrap specific providers (OpenAI-compatible APIs,
//! local models, test doubles).

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

/// Vision-language description of images.
#[async_trait]
pub trait DescriptionProvider: Send + Sync {
    /// Describe an image. `format` is the normalized format name.
    async fn describe(&self, image: &[u8], format: &str) -> Result<String>;

    /// Model identifier, used to key cached descriptions.
    fn model(&self) -> &str;
}

/// Text embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed document text for indexing.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a search query.
    ///
    /// Providers with asymmetric query/document encoders override this.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// Model identifier, recorded on every vector.
    fn model(&self) -> &str;
}

/// A system + user message pair with sampling limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens: 300,
            temperature: 0.3,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Stream of content tokens from a streaming completion.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Chat completion.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Complete and return the full assistant message.
    async fn complete(&self, request: ChatRequest) -> Result<String>;

    /// Complete and yield content tokens as they arrive.
    async fn stream(&self, request: ChatRequest) -> Result<TokenStream>;
}
