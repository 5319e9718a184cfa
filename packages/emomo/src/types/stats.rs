//! Ingestion options and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-invocation ingestion options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Re-ingest content even if the source item or the vector already exists
    #[serde(default)]
    pub force: bool,

    /// With `force`, describe again even if a description for the current
    /// model exists. ORed with the pipeline's configured default.
    #[serde(default)]
    pub regenerate_descriptions: bool,
}

impl IngestOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            regenerate_descriptions: false,
        }
    }

    pub fn with_regenerate_descriptions(mut self, regenerate: bool) -> Self {
        self.regenerate_descriptions = regenerate;
        self
    }
}

/// Aggregate outcome of an ingestion or retry run.
///
/// `processed` counts every item a worker finished, whatever the outcome;
/// `skipped` and `failed` are subsets of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub total: u64,
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl IngestStats {
    pub(crate) fn started() -> Self {
        let now = Utc::now();
        Self {
            total: 0,
            processed: 0,
            skipped: 0,
            failed: 0,
            start_time: now,
            end_time: now,
        }
    }

    /// Items that were newly ingested.
    pub fn succeeded(&self) -> u64 {
        self.processed.saturating_sub(self.skipped + self.failed)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}

/// Corpus overview for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub active_memes: u64,
    pub pending_memes: u64,
    pub categories: Vec<String>,
    pub collections: Vec<String>,
}
