//! OpenAI-compatible provider adapters.
//!
//! Thin wrappers over `openai_client` implementing the description,
//! embedding and chat traits. Any server speaking the OpenAI wire format
//! works through `OpenAIConfig::base_url`.
//!
//! # Example
//!
//! ```rust,ignore
//! use emomo::ai::{OpenAIChat, OpenAIDescriber, OpenAIEmbedder};
//!
//! let client = openai_config.client();
//! let describer = OpenAIDescriber::new(client.clone(), &config.vlm_model);
//! let embedder = OpenAIEmbedder::new(client.clone(), &config.embedding_model);
//! ```

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use openai_client::{ChatRequest as ApiChatRequest, Message, OpenAIClient, OpenAIError};
use tracing::debug;

use crate::config::OpenAIConfig;
use crate::error::{EmomoError, Result};
use crate::media::format::content_type_for;
use crate::query::prompts::{DESCRIBE_SYSTEM_PROMPT, DESCRIBE_USER_PROMPT};
use crate::traits::ai::{
    ChatProvider, ChatRequest, DescriptionProvider, EmbeddingProvider, TokenStream,
};

/// Completion budget for one image description.
pub const DESCRIBE_MAX_TOKENS: u32 = 400;

impl OpenAIConfig {
    /// Build a client for this endpoint.
    pub fn client(&self) -> OpenAIClient {
        let client = OpenAIClient::new(self.api_key.expose());
        match &self.base_url {
            Some(url) => client.with_base_url(url),
            None => client,
        }
    }
}

// ============================================================================
// Description
// ============================================================================

/// Vision-language descriptions via chat completion with an inline image.
#[derive(Clone)]
pub struct OpenAIDescriber {
    client: OpenAIClient,
    model: String,
    max_tokens: u32,
}

impl OpenAIDescriber {
    pub fn new(client: OpenAIClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: DESCRIBE_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn request(&self, image: &[u8], format: &str) -> ApiChatRequest {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let url = openai_client::data_url(content_type_for(format), &encoded);

        ApiChatRequest::new(&self.model)
            .message(Message::system(DESCRIBE_SYSTEM_PROMPT))
            .message(Message::user_with_image(DESCRIBE_USER_PROMPT, url))
            .token_limit(self.max_tokens)
    }
}

#[async_trait]
impl DescriptionProvider for OpenAIDescriber {
    async fn describe(&self, image: &[u8], format: &str) -> Result<String> {
        let response = self
            .client
            .chat_completion(self.request(image, format))
            .await
            .map_err(description_error)?;

        let text = response.content.trim();
        if text.is_empty() {
            return Err(EmomoError::Description("empty description".into()));
        }
        debug!(model = %self.model, bytes = image.len(), chars = text.chars().count(), "described image");
        Ok(text.to_string())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Embeddings
// ============================================================================

/// Text embeddings via the `/embeddings` endpoint.
#[derive(Clone)]
pub struct OpenAIEmbedder {
    client: OpenAIClient,
    model: String,
    dimensions: Option<u32>,
}

impl OpenAIEmbedder {
    pub fn new(client: OpenAIClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions: None,
        }
    }

    /// Request shortened vectors from models that support it.
    pub fn with_dimensions(mut self, dimensions: u32) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.client
            .create_embedding_with_dimensions(text, &self.model, self.dimensions)
            .await
            .map_err(|e| EmomoError::Embedding(Box::new(e)))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Chat
// ============================================================================

/// Chat completion, blocking or streamed.
#[derive(Clone)]
pub struct OpenAIChat {
    client: OpenAIClient,
    model: String,
}

impl OpenAIChat {
    pub fn new(client: OpenAIClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn request(&self, request: ChatRequest) -> ApiChatRequest {
        ApiChatRequest::new(&self.model)
            .message(Message::system(request.system))
            .message(Message::user(request.user))
            .temperature(request.temperature)
            .token_limit(request.max_tokens)
    }
}

#[async_trait]
impl ChatProvider for OpenAIChat {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let response = self
            .client
            .chat_completion(self.request(request))
            .await
            .map_err(chat_error)?;
        Ok(response.content)
    }

    async fn stream(&self, request: ChatRequest) -> Result<TokenStream> {
        let chunks = self
            .client
            .chat_completion_stream(self.request(request))
            .await
            .map_err(chat_error)?;

        Ok(chunks.map(|delta| delta.map_err(chat_error)).boxed())
    }
}

fn chat_error(e: OpenAIError) -> EmomoError {
    EmomoError::Chat(Box::new(e))
}

fn description_error(e: OpenAIError) -> EmomoError {
    EmomoError::Description(Box::new(e))
}
