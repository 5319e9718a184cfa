//! Configuration loaded from environment variables.
//!
//! `Config::from_env()` reads `.env` (if present) and then the process
//! environment. Every sub-config also has `Default` and `with_*` setters so
//! components can be built in code and in tests.

use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretBox};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EmomoError, Result};

/// Ingestion pipeline settings.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    /// Concurrent worker tasks
    pub workers: usize,

    /// Items requested from the source per page
    pub batch_size: usize,

    /// Regenerate the cached description for the current model on forced runs
    pub regenerate_descriptions_on_force: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            batch_size: 50,
            regenerate_descriptions_on_force: false,
        }
    }
}

impl IngestConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_regenerate_descriptions_on_force(mut self, regenerate: bool) -> Self {
        self.regenerate_descriptions_on_force = regenerate;
        self
    }
}

/// Query understanding settings.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryUnderstandingConfig {
    /// Use the LLM path (the heuristic path is always available)
    pub enabled: bool,

    pub model: String,
    pub cache_size: usize,
    pub cache_ttl: Duration,

    /// Longer queries skip the LLM
    pub max_query_chars: usize,

    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for QueryUnderstandingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "gpt-4o-mini".to_string(),
            cache_size: 100,
            cache_ttl: Duration::from_secs(600),
            max_query_chars: 100,
            max_tokens: 300,
            temperature: 0.3,
            timeout: Duration::from_secs(30),
        }
    }
}

impl QueryUnderstandingConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_cache(mut self, size: usize, ttl: Duration) -> Self {
        self.cache_size = size;
        self.cache_ttl = ttl;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Search settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub default_collection: String,

    /// Minimum score for dense-fallback results (0 disables)
    pub score_threshold: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_collection: "emomo".to_string(),
            score_threshold: 0.0,
        }
    }
}

impl SearchConfig {
    pub fn with_default_collection(mut self, collection: impl Into<String>) -> Self {
        self.default_collection = collection.into();
        self
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }
}

/// An API key that never shows up in debug output or logs.
pub struct ApiKey(SecretBox<str>);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretBox::new(key.into().into_boxed_str()))
    }

    /// The raw key, for building request headers only.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for ApiKey {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl PartialEq for ApiKey {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// OpenAI-compatible endpoint credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAIConfig {
    pub api_key: ApiKey,
    pub base_url: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub ingest: IngestConfig,
    pub query_understanding: QueryUnderstandingConfig,
    pub search: SearchConfig,
    pub openai: Option<OpenAIConfig>,
    pub vlm_model: String,
    pub embedding_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ingest: IngestConfig::default(),
            query_understanding: QueryUnderstandingConfig::default(),
            search: SearchConfig::default(),
            openai: None,
            vlm_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let ingest = IngestConfig {
            workers: parse_or(&lookup, "INGEST_WORKERS", defaults.ingest.workers)?.max(1),
            batch_size: parse_or(&lookup, "INGEST_BATCH_SIZE", defaults.ingest.batch_size)?.max(1),
            regenerate_descriptions_on_force: parse_bool_or(
                &lookup,
                "INGEST_REGENERATE_DESCRIPTIONS",
                defaults.ingest.regenerate_descriptions_on_force,
            )?,
        };

        let qu_defaults = defaults.query_understanding;
        let query_understanding = QueryUnderstandingConfig {
            enabled: parse_bool_or(&lookup, "QUERY_UNDERSTANDING_ENABLED", qu_defaults.enabled)?,
            model: lookup("QUERY_UNDERSTANDING_MODEL").unwrap_or(qu_defaults.model),
            cache_size: parse_or(
                &lookup,
                "QUERY_UNDERSTANDING_CACHE_SIZE",
                qu_defaults.cache_size,
            )?,
            cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "QUERY_UNDERSTANDING_CACHE_TTL_SECS",
                qu_defaults.cache_ttl.as_secs(),
            )?),
            ..qu_defaults
        };

        let search = SearchConfig {
            default_collection: lookup("SEARCH_DEFAULT_COLLECTION")
                .unwrap_or(defaults.search.default_collection),
            score_threshold: parse_or(
                &lookup,
                "SEARCH_SCORE_THRESHOLD",
                defaults.search.score_threshold,
            )?,
        };

        let openai = lookup("OPENAI_API_KEY")
            .filter(|key| !key.is_empty())
            .map(|api_key| OpenAIConfig {
                api_key: ApiKey::new(api_key),
                base_url: lookup("OPENAI_BASE_URL").filter(|url| !url.is_empty()),
            });

        Ok(Self {
            ingest,
            query_understanding,
            search,
            openai,
            vlm_model: lookup("VLM_MODEL").unwrap_or(defaults.vlm_model),
            embedding_model: lookup("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| EmomoError::Config(format!("{key} must be a valid number, got {raw:?}"))),
        _ => Ok(default),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(EmomoError::Config(format!("{key} must be a boolean, got {raw:?}"))),
        },
    }
}
