// src/ingest/providers/http.rs
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RelayError, Result};
use crate::ingest::parse::parse_feed;
use crate::ingest::types::{FeedSource, FeedSpec, ParsedFeed};

pub const FEED_USER_AGENT: &str = concat!("news-relay/", env!("CARGO_PKG_VERSION"));

/// Fetches feeds over HTTP. One GET per feed, no retries within a cycle.
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(FEED_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, feed: &FeedSpec) -> Result<ParsedFeed> {
        let resp = self
            .client
            .get(&feed.url)
            .send()
            .await
            .map_err(|e| RelayError::fetch(&feed.url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::fetch(&feed.url, format!("HTTP {status}")));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| RelayError::fetch(&feed.url, e))?;
        parse_feed(&body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
