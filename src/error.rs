// src/error.rs
//! Error taxonomy for the relay. Every variant is recoverable at some level:
//! per entry, per feed, per item, per destination or per cycle.

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("fetch failed for {feed}: {reason}")]
    Fetch { feed: String, reason: String },

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("summarization via {provider} failed: {reason}")]
    Summarization { provider: String, reason: String },

    #[error("summary has {} ungrounded numeric token(s): {}", .ungrounded.len(), .ungrounded.join(", "))]
    FactMismatch { ungrounded: Vec<String> },

    #[error("dispatch to {destination} failed: {reason}")]
    Dispatch { destination: String, reason: String },

    #[error("lease held by {holder} ({age_secs}s old)")]
    LeaseConflict { holder: String, age_secs: i64 },

    #[error("registry I/O error: {0}")]
    RegistryIo(#[source] std::io::Error),

    #[error("lease I/O error: {0}")]
    LeaseIo(#[source] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RelayError {
    pub fn fetch(feed: &str, reason: impl ToString) -> Self {
        Self::Fetch {
            feed: feed.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn summarization(provider: &str, reason: impl ToString) -> Self {
        Self::Summarization {
            provider: provider.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn dispatch(destination: &str, reason: impl ToString) -> Self {
        Self::Dispatch {
            destination: destination.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
