//! Collaborator traits.
//!
//! These traits define the interfaces that applications implement
//! to provide sources, storage, vector search and AI capabilities.

pub mod ai;
pub mod object_store;
pub mod repository;
pub mod source;
pub mod vector_store;
