//! Named collection bindings.
//!
//! A collection is a vector-store partition tied to one embedding model.
//! Ingestion writes to one binding; search resolves a binding by name.

use std::fmt;
use std::sync::Arc;

use crate::error::{EmomoError, Result};
use crate::traits::ai::EmbeddingProvider;
use crate::traits::vector_store::VectorStore;

/// An embedding provider paired with the vector store it feeds.
#[derive(Clone)]
pub struct CollectionBinding {
    name: String,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl CollectionBinding {
    /// Bind an embedder to a store. The collection name comes from the store.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            name: store.collection().to_string(),
            embedder,
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model()
    }
}

impl fmt::Debug for CollectionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionBinding")
            .field("name", &self.name)
            .field("embedding_model", &self.embedder.model())
            .finish()
    }
}

/// Registry of collections with one default.
#[derive(Debug, Clone)]
pub struct CollectionRegistry {
    /// Default binding first
    bindings: Vec<CollectionBinding>,
}

impl CollectionRegistry {
    pub fn new(default: CollectionBinding) -> Self {
        Self {
            bindings: vec![default],
        }
    }

    /// Register another collection. A binding with the same name as an
    /// existing one replaces it.
    pub fn with_collection(mut self, binding: CollectionBinding) -> Self {
        match self.bindings.iter_mut().find(|b| b.name == binding.name) {
            Some(existing) => *existing = binding,
            None => self.bindings.push(binding),
        }
        self
    }

    pub fn default_binding(&self) -> &CollectionBinding {
        &self.bindings[0]
    }

    /// Resolve a collection by name; `None` or an empty name is the default.
    pub fn resolve(&self, name: Option<&str>) -> Result<&CollectionBinding> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => Ok(self.default_binding()),
            Some(name) => self
                .bindings
                .iter()
                .find(|b| b.name == name)
                .ok_or_else(|| EmomoError::UnknownCollection(name.to_string())),
        }
    }

    /// Collection names, default first.
    pub fn available_collections(&self) -> Vec<String> {
        self.bindings.iter().map(|b| b.name.clone()).collect()
    }
}
