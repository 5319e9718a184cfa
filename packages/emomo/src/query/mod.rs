//! Query understanding.
//!
//! Turns a raw search query into a [`RetrievalPlan`](crate::types::plan::RetrievalPlan):
//! an LLM plan when a chat provider is configured, a rule-based plan otherwise
//! or whenever the LLM path fails.

pub mod cache;
pub mod heuristics;
pub mod parser;
pub mod prompts;
pub mod service;
pub mod validate;

pub use cache::PlanCache;
pub use heuristics::heuristic_plan;
pub use parser::StreamParser;
pub use service::{QueryUnderstandingService, UnderstandProgress, UnderstandStage};
