// src/ingest/types.rs
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::dedup::Fingerprint;
use crate::error::Result;

/// One configured feed. `priority` feeds are always dispatched ahead of the rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedSpec {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub priority: bool,
}

impl FeedSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            priority: false,
        }
    }

    pub fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Entry as found in the feed document, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<RawEntry>,
}

/// Canonical item flowing through the pipeline.
///
/// `title` and `body` are overwritten once by the summarization step; everything
/// else is fixed at normalization time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    /// Canonical URL: wrapper resolved, query and fragment stripped. Empty if the entry had no link.
    pub url: String,
    pub body: String,
    pub source: String,
    pub published_at: Option<DateTime<FixedOffset>>,
    pub priority: bool,
    pub cover_url: Option<String>,
}

impl NewsItem {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.url, &self.title)
    }

    /// Key recorded in the sent registry. URL-less items fall back to their fingerprint.
    pub fn registry_key(&self) -> String {
        if self.url.is_empty() {
            format!("fingerprint:{}", self.fingerprint().as_str())
        } else {
            self.url.clone()
        }
    }
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch and parse one feed. Any error means "zero entries" for this cycle.
    async fn fetch(&self, feed: &FeedSpec) -> Result<ParsedFeed>;
    fn name(&self) -> &'static str;
}
