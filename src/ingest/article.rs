// src/ingest/article.rs
//! Best-effort main text of an article page, used as summarizer input.
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{RelayError, Result};
use crate::ingest::html_to_text;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub const MAX_ARTICLE_CHARS: usize = 8000;
const MIN_PARAGRAPH_CHARS: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Article {
    pub text: String,
    pub cover_url: Option<String>,
}

#[async_trait]
pub trait ArticleReader: Send + Sync {
    async fn read(&self, url: &str) -> Result<Article>;
}

pub struct HttpArticleReader {
    client: reqwest::Client,
}

impl HttpArticleReader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArticleReader for HttpArticleReader {
    async fn read(&self, url: &str) -> Result<Article> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(RelayError::fetch(url, format!("HTTP {}", resp.status())));
        }
        let is_html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("html"));
        if !is_html {
            return Ok(Article::default());
        }
        let html = resp.text().await?;
        Ok(extract_article(&html))
    }
}

static RE_NOISE: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "style", "nav", "header", "footer", "aside", "noscript", "iframe"]
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("noise regex"))
        .collect()
});
static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex"));
static RE_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<article\b[^>]*>(.*?)</article\s*>").expect("article regex"));
static RE_PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p\s*>").expect("paragraph regex"));
static RE_OG_IMAGE: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r#"(?is)<meta[^>]+property\s*=\s*["']og:image["'][^>]*content\s*=\s*["']([^"']+)["']"#)
            .expect("og regex"),
        Regex::new(r#"(?is)<meta[^>]+content\s*=\s*["']([^"']+)["'][^>]*property\s*=\s*["']og:image["']"#)
            .expect("og regex"),
    ]
});

/// Extract the cover image and readable text from a page.
pub fn extract_article(html: &str) -> Article {
    let cover_url = RE_OG_IMAGE
        .iter()
        .find_map(|re| re.captures(html))
        .map(|c| html_escape::decode_html_entities(&c[1]).trim().to_string())
        .filter(|u| !u.is_empty());

    let mut cleaned = RE_COMMENT.replace_all(html, " ").into_owned();
    for re in RE_NOISE.iter() {
        cleaned = re.replace_all(&cleaned, " ").into_owned();
    }

    let from_article: Vec<String> = RE_ARTICLE
        .captures_iter(&cleaned)
        .map(|c| html_to_text(&c[1]))
        .filter(|t| !t.is_empty())
        .collect();

    let text = if !from_article.is_empty() {
        from_article.join(" ")
    } else {
        let paragraphs: Vec<String> = RE_PARAGRAPH
            .captures_iter(&cleaned)
            .map(|c| html_to_text(&c[1]))
            .filter(|p| p.chars().count() > MIN_PARAGRAPH_CHARS)
            .collect();
        if paragraphs.is_empty() {
            html_to_text(&cleaned)
        } else {
            paragraphs.join(" ")
        }
    };

    Article {
        text: text.chars().take(MAX_ARTICLE_CHARS).collect(),
        cover_url,
    }
}

/// Summarizer input: the article text, or a title/excerpt pair when the page yielded too little.
pub fn summarizer_content(title: &str, feed_body: &str, article_text: &str) -> String {
    if article_text.chars().count() > 100 {
        article_text.to_string()
    } else {
        format!("Title: {title}\n\nContent: {feed_body}")
    }
}
