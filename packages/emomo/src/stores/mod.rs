//! Storage implementations.
//!
//! Available backends:
//! - `memory` - In-memory repositories, object store and vector store (always available)
//! - `postgres` - PostgreSQL repositories (requires `postgres` feature)

use std::sync::Arc;

use crate::traits::object_store::ObjectStore;
use crate::traits::repository::{DescriptionRepository, MemeRepository, VectorRepository};

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{
    MemoryDescriptionRepository, MemoryMemeRepository, MemoryObjectStore, MemoryStores,
    MemoryVectorRepository, MemoryVectorStore,
};

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// The stores shared by ingestion and search.
#[derive(Clone)]
pub struct StoreSet {
    pub memes: Arc<dyn MemeRepository>,
    pub descriptions: Arc<dyn DescriptionRepository>,
    pub vectors: Arc<dyn VectorRepository>,
    pub objects: Arc<dyn ObjectStore>,
}

impl StoreSet {
    pub fn new(
        memes: Arc<dyn MemeRepository>,
        descriptions: Arc<dyn DescriptionRepository>,
        vectors: Arc<dyn VectorRepository>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            memes,
            descriptions,
            vectors,
            objects,
        }
    }
}
