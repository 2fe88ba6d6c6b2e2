// tests/ingest_fetch.rs
use std::time::Duration;

use chrono::{TimeZone, Utc};
use news_relay::dedup::{Deduplicator, MemoryDedupStore};
use news_relay::error::RelayError;
use news_relay::ingest::collect_once;
use news_relay::ingest::normalize::{ItemNormalizer, NoopResolver};
use news_relay::ingest::providers::HttpFeedSource;
use news_relay::ingest::recency::RecencyFilter;
use news_relay::ingest::types::{FeedSource, FeedSpec};
use std::sync::Arc;

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("missing fixture")
}

#[tokio::test]
async fn rss_over_http_parses_entries_and_media() {
    let mut server = mockito::Server::new_async().await;
    let m = server
        .mock("GET", "/feed/")
        .with_status(200)
        .with_header("content-type", "application/rss+xml")
        .with_body(fixture("tech_rss.xml"))
        .create_async()
        .await;

    let source = HttpFeedSource::new(Duration::from_secs(5)).unwrap();
    let parsed = source
        .fetch(&FeedSpec::new(format!("{}/feed/", server.url())))
        .await
        .expect("rss parse ok");
    m.assert_async().await;

    assert_eq!(parsed.title.as_deref(), Some("SoyaCincau"));
    assert_eq!(parsed.entries.len(), 4);
    let first = &parsed.entries[0];
    assert_eq!(first.title.as_deref(), Some("Xiaomi 15T launches in Malaysia at RM1,999"));
    assert_eq!(
        first.media_url.as_deref(),
        Some("https://cdn.soyacincau.test/xiaomi-15t.jpg")
    );
    assert!(first.published.is_some());
}

#[tokio::test]
async fn atom_over_http_parses_entries() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/atom")
        .with_status(200)
        .with_body(fixture("news_atom.xml"))
        .create_async()
        .await;

    let source = HttpFeedSource::new(Duration::from_secs(5)).unwrap();
    let parsed = source
        .fetch(&FeedSpec::new(format!("{}/atom", server.url())))
        .await
        .expect("atom parse ok");
    assert_eq!(parsed.title.as_deref(), Some("Bernama"));
    assert_eq!(parsed.entries.len(), 3);
    assert_eq!(
        parsed.entries[0].link.as_deref(),
        Some("https://www.bernama.test/news/opr-unchanged")
    );
}

#[tokio::test]
async fn dublin_core_dates_and_content_module_are_honoured() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/dc")
        .with_status(200)
        .with_body(fixture("dc_rss.xml"))
        .create_async()
        .await;

    let feeds = vec![FeedSpec::new(format!("{}/dc", server.url()))];
    let source = HttpFeedSource::new(Duration::from_secs(5)).unwrap();
    let parsed = source.fetch(&feeds[0]).await.expect("rss parse ok");
    let first = &parsed.entries[0];
    assert_eq!(first.published.as_deref(), Some("2025-10-14T03:20:00Z"));
    assert!(first.summary.as_deref().unwrap_or_default().contains("10,000 tempahan"));
    assert_eq!(first.media_url.as_deref(), Some("https://cdn.amanz.test/emas7.jpg"));

    // The archive item is dated only through dc:date and must fall outside the window.
    let normalizer = ItemNormalizer::new(Arc::new(NoopResolver));
    let recency = RecencyFilter::from_hours(6);
    let mut dedup = Deduplicator::new(Box::new(MemoryDedupStore::new()));
    let now = Utc.with_ymd_and_hms(2025, 10, 14, 4, 0, 0).unwrap();
    let (items, stats) = collect_once(&feeds, &source, &normalizer, &recency, &mut dedup, now).await;
    assert_eq!(stats.stale, 1);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].cover_url.as_deref(), Some("https://cdn.amanz.test/emas7.jpg"));
}

#[tokio::test]
async fn http_error_is_a_fetch_error() {
    let mut server = mockito::Server::new_async().await;
    let _m = server.mock("GET", "/down").with_status(500).create_async().await;

    let source = HttpFeedSource::new(Duration::from_secs(5)).unwrap();
    let err = source
        .fetch(&FeedSpec::new(format!("{}/down", server.url())))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Fetch { .. }), "got {err:?}");
}

#[tokio::test]
async fn garbage_body_is_a_parse_error() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/html")
        .with_status(200)
        .with_body("<!DOCTYPE html><html><head><title>Blocked</title></head><body>captcha</body></html>")
        .create_async()
        .await;

    let source = HttpFeedSource::new(Duration::from_secs(5)).unwrap();
    let err = source
        .fetch(&FeedSpec::new(format!("{}/html", server.url())))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Parse(_)), "got {err:?}");
}

#[tokio::test]
async fn failing_feed_does_not_block_the_others() {
    let mut server = mockito::Server::new_async().await;
    let _down = server.mock("GET", "/down").with_status(503).create_async().await;
    let _ok = server
        .mock("GET", "/atom")
        .with_status(200)
        .with_body(fixture("news_atom.xml"))
        .create_async()
        .await;

    let feeds = vec![
        FeedSpec::new(format!("{}/down", server.url())).with_priority(true),
        FeedSpec::new(format!("{}/atom", server.url())),
    ];
    let source = HttpFeedSource::new(Duration::from_secs(5)).unwrap();
    let normalizer = ItemNormalizer::new(Arc::new(NoopResolver));
    let recency = RecencyFilter::from_hours(6);
    let mut dedup = Deduplicator::new(Box::new(MemoryDedupStore::new()));
    let now = Utc.with_ymd_and_hms(2025, 10, 14, 4, 0, 0).unwrap();

    let (items, stats) = collect_once(&feeds, &source, &normalizer, &recency, &mut dedup, now).await;
    assert_eq!(stats.feeds_failed, 1);
    assert_eq!(stats.entries, 3);
    // next-year entry is rejected
    assert_eq!(stats.stale, 1);
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.source == "Bernama"));
}
