//! Domain types for ingestion and search.

pub mod item;
pub mod meme;
pub mod plan;
pub mod search;
pub mod stats;
