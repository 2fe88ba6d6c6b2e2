// src/ingest/providers/fixture.rs
use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{RelayError, Result};
use crate::ingest::parse::parse_feed;
use crate::ingest::types::{FeedSource, FeedSpec, ParsedFeed};

/// In-memory feed documents keyed by feed URL. Unknown URLs fail like a dead host.
#[derive(Debug, Default, Clone)]
pub struct FixtureFeedSource {
    docs: HashMap<String, String>,
}

impl FixtureFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, url: impl Into<String>, xml: impl Into<String>) -> Self {
        self.docs.insert(url.into(), xml.into());
        self
    }
}

#[async_trait]
impl FeedSource for FixtureFeedSource {
    async fn fetch(&self, feed: &FeedSpec) -> Result<ParsedFeed> {
        let xml = self
            .docs
            .get(&feed.url)
            .ok_or_else(|| RelayError::fetch(&feed.url, "no fixture registered"))?;
        parse_feed(xml)
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
