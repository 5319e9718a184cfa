//! Provider adapters for the AI traits.
//!
//! Test doubles live in [`crate::testing`].

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "openai")]
pub use openai::{OpenAIChat, OpenAIDescriber, OpenAIEmbedder, DESCRIBE_MAX_TOKENS};
