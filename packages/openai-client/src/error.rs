//! Errors returned by [`OpenAIClient`](crate::OpenAIClient).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OpenAIError>;

#[derive(Debug, Error)]
pub enum OpenAIError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connection, timeout or body read failure
    #[error("request to {path} failed: {source}")]
    Transport {
        path: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response
    #[error("{path} returned {status}: {body}")]
    Status {
        path: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// Response body or stream chunk did not match the wire format
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// A 2xx response without a choice or embedding in it
    #[error("{0} response carried no result")]
    Empty(&'static str),
}

impl OpenAIError {
    /// HTTP status of a rejected request.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Rate limits and server-side failures.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_timeout() || source.is_connect(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let limited = OpenAIError::Status {
            path: "chat/completions",
            status: 429,
            body: "slow down".into(),
        };
        assert_eq!(limited.status(), Some(429));
        assert!(limited.is_transient());

        let rejected = OpenAIError::Status {
            path: "embeddings",
            status: 400,
            body: "bad input".into(),
        };
        assert!(!rejected.is_transient());
        assert_eq!(rejected.to_string(), "embeddings returned 400: bad input");

        assert!(!OpenAIError::Empty("embeddings").is_transient());
        assert_eq!(OpenAIError::MissingApiKey.status(), None);
    }
}
