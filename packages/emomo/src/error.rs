//! Typed errors for the emomo library.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Failures of external
//! collaborators carry the collaborator's own error as a boxed source so the
//! caller keeps the full chain.

use thiserror::Error;

/// Boxed error produced by an external collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during ingestion and search.
#[derive(Debug, Error)]
pub enum EmomoError {
    /// Source fetch failed
    #[error("source error: {0}")]
    Source(#[source] BoxError),

    /// Object storage operation failed
    #[error("object store error: {0}")]
    ObjectStore(#[source] BoxError),

    /// Relational repository operation failed
    #[error("repository error: {0}")]
    Repository(#[source] BoxError),

    /// Vector index operation failed
    #[error("vector store error: {0}")]
    VectorStore(#[source] BoxError),

    /// Vision-language description failed
    #[error("description error: {0}")]
    Description(#[source] BoxError),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(#[source] BoxError),

    /// Chat completion failed
    #[error("chat completion error: {0}")]
    Chat(#[source] BoxError),

    /// Image could not be decoded or re-encoded
    #[error("image format error: {0}")]
    Format(#[source] BoxError),

    /// Record not found
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Search requested a collection that is not registered
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Local filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EmomoError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Wrap a plain message as a repository error.
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into().into())
    }

    /// Wrap a plain message as a vector store error.
    pub fn vector_store(msg: impl Into<String>) -> Self {
        Self::VectorStore(msg.into().into())
    }

    /// Wrap a plain message as an object store error.
    pub fn object_store(msg: impl Into<String>) -> Self {
        Self::ObjectStore(msg.into().into())
    }
}

/// Result type alias for emomo operations.
pub type Result<T> = std::result::Result<T, EmomoError>;
