// src/ingest/normalize.rs
//! Raw entry to `NewsItem`: title validation, body cleaning and URL canonicalization.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::error::Result;
use crate::ingest::parse::parse_timestamp;
use crate::ingest::types::{FeedSpec, NewsItem, RawEntry};
use crate::ingest::{html_to_text, normalize_text};

/// Query parameters that aggregators use to carry the destination URL.
pub const EMBEDDED_URL_PARAMS: &[&str] = &[
    "url", "u", "q", "link", "target", "dest", "destination", "redirect", "to",
];

/// Hosts whose links are redirects to the real article.
pub const DEFAULT_WRAPPER_HOSTS: &[&str] = &[
    "news.google.com",
    "feedproxy.google.com",
    "feeds.feedburner.com",
    "rsshub.app",
    "t.co",
    "bit.ly",
    "l.facebook.com",
    "out.reddit.com",
];

const MAX_UNWRAP_DEPTH: usize = 3;

/// Follows a wrapper link to wherever it finally lands.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<String>;
}

/// Resolver that leaves URLs untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResolver;

#[async_trait]
impl UrlResolver for NoopResolver {
    async fn resolve(&self, url: &str) -> Result<String> {
        Ok(url.to_string())
    }
}

/// Resolves by issuing a GET and reading the final URL after redirects.
pub struct HttpResolver {
    client: reqwest::Client,
}

impl HttpResolver {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(crate::ingest::article::BROWSER_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UrlResolver for HttpResolver {
    async fn resolve(&self, url: &str) -> Result<String> {
        let resp = self.client.get(url).send().await?;
        Ok(resp.url().to_string())
    }
}

/// Drop query and fragment. Unparseable input is cut at the first `?` / `#`.
pub fn strip_query(link: &str) -> String {
    let link = link.trim();
    match Url::parse(link) {
        Ok(mut u) => {
            u.set_query(None);
            u.set_fragment(None);
            u.to_string()
        }
        Err(_) => link
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Destination carried in a query parameter, unwrapping nested wrappers.
pub fn embedded_target(link: &str) -> Option<String> {
    let mut current = Url::parse(link.trim()).ok()?;
    let mut found = None;
    for _ in 0..MAX_UNWRAP_DEPTH {
        let inner = current
            .query_pairs()
            .filter(|(k, _)| EMBEDDED_URL_PARAMS.contains(&k.to_ascii_lowercase().as_str()))
            .find_map(|(_, v)| {
                Url::parse(&v)
                    .ok()
                    .filter(|u| matches!(u.scheme(), "http" | "https"))
            });
        match inner {
            Some(u) => {
                found = Some(u.to_string());
                current = u;
            }
            None => break,
        }
    }
    found
}

fn host_of(link: &str) -> Option<String> {
    Url::parse(link.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

pub struct ItemNormalizer {
    resolver: Arc<dyn UrlResolver>,
    wrapper_hosts: Vec<String>,
    resolved: Mutex<HashMap<String, String>>,
}

impl ItemNormalizer {
    pub fn new(resolver: Arc<dyn UrlResolver>) -> Self {
        Self {
            resolver,
            wrapper_hosts: DEFAULT_WRAPPER_HOSTS.iter().map(|h| h.to_string()).collect(),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_wrapper_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wrapper_hosts = hosts.into_iter().map(|h| h.into().to_ascii_lowercase()).collect();
        self
    }

    fn is_wrapper(&self, link: &str) -> bool {
        host_of(link).is_some_and(|h| self.wrapper_hosts.iter().any(|w| *w == h))
    }

    /// Canonical URL for a feed link: embedded target, else redirect target for
    /// wrapper hosts, then query and fragment stripped.
    pub async fn canonicalize(&self, link: &str) -> String {
        if let Some(inner) = embedded_target(link) {
            return strip_query(&inner);
        }
        if !self.is_wrapper(link) {
            return strip_query(link);
        }

        let cached = self
            .resolved
            .lock()
            .ok()
            .and_then(|m| m.get(link).cloned());
        if let Some(hit) = cached {
            return hit;
        }

        match self.resolver.resolve(link).await {
            Ok(resolved) => {
                let canonical = strip_query(&embedded_target(&resolved).unwrap_or(resolved));
                debug!(target: "ingest", wrapper = %link, canonical = %canonical, "wrapper resolved");
                if let Ok(mut m) = self.resolved.lock() {
                    m.insert(link.to_string(), canonical.clone());
                }
                canonical
            }
            Err(e) => {
                warn!(target: "ingest", wrapper = %link, error = %e, "wrapper resolution failed; keeping link");
                strip_query(link)
            }
        }
    }

    /// `None` when the entry has no usable title.
    pub async fn normalize(
        &self,
        entry: RawEntry,
        feed: &FeedSpec,
        source_name: &str,
    ) -> Option<NewsItem> {
        let title = entry.title.as_deref().map(html_to_text).unwrap_or_default();
        if title.is_empty() {
            return None;
        }

        let url = match entry.link.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            Some(link) => self.canonicalize(link).await,
            None => String::new(),
        };

        let published_at = entry
            .published
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| entry.updated.as_deref().and_then(parse_timestamp));

        Some(NewsItem {
            title,
            url,
            body: normalize_text(entry.summary.as_deref().unwrap_or_default()),
            source: source_name.to_string(),
            published_at,
            priority: feed.priority,
            cover_url: entry.media_url,
        })
    }
}
