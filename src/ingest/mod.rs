// src/ingest/mod.rs
pub mod article;
pub mod normalize;
pub mod parse;
pub mod providers;
pub mod recency;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, warn};

use crate::dedup::{Admission, Deduplicator};
use crate::ingest::normalize::ItemNormalizer;
use crate::ingest::recency::RecencyFilter;
use crate::ingest::types::{FeedSource, FeedSpec, NewsItem};

/// Feed bodies are excerpts; anything longer gets cut here.
pub const MAX_BODY_CHARS: usize = 1500;

/// HTML fragment to plain text: decode entities, strip tags, collapse whitespace.
pub fn html_to_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (nbsp included)
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Feed description to body excerpt: `html_to_text` plus a length cap.
pub fn normalize_text(s: &str) -> String {
    let out = html_to_text(s);
    if out.chars().count() > MAX_BODY_CHARS {
        out.chars().take(MAX_BODY_CHARS).collect()
    } else {
        out
    }
}

/// Display name for a feed: configured name, then channel title, then last URL path segment.
pub fn source_display_name(feed: &FeedSpec, channel_title: Option<&str>) -> String {
    if let Some(name) = feed.name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return name.to_string();
    }
    if let Some(title) = channel_title.map(html_to_text).filter(|s| !s.is_empty()) {
        return title;
    }
    feed.url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|seg| seg.split('?').next().unwrap_or(seg))
        .filter(|seg| !seg.is_empty() && !seg.contains(':'))
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Per-cycle ingest counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub feeds_failed: usize,
    pub entries: usize,
    pub dropped_untitled: usize,
    pub stale: usize,
    pub duplicates: usize,
    pub already_sent: usize,
}

/// Fetch every feed in order and return the admitted backlog in discovery order.
///
/// A failing feed contributes zero entries; the remaining feeds are still polled.
pub async fn collect_once(
    feeds: &[FeedSpec],
    source: &dyn FeedSource,
    normalizer: &ItemNormalizer,
    recency: &RecencyFilter,
    dedup: &mut Deduplicator,
    now: DateTime<Utc>,
) -> (Vec<NewsItem>, CollectStats) {
    let mut stats = CollectStats::default();
    let mut backlog = Vec::new();

    for feed in feeds {
        let parsed = match source.fetch(feed).await {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "ingest", feed = %feed.url, error = %e, "feed fetch failed; skipping");
                counter!("relay_feed_errors_total").increment(1);
                stats.feeds_failed += 1;
                continue;
            }
        };
        let source_name = source_display_name(feed, parsed.title.as_deref());
        debug!(target: "ingest", feed = %feed.url, entries = parsed.entries.len(), source = %source_name, "feed parsed");

        for entry in parsed.entries {
            stats.entries += 1;
            counter!("relay_entries_total").increment(1);

            let Some(item) = normalizer.normalize(entry, feed, &source_name).await else {
                stats.dropped_untitled += 1;
                continue;
            };

            if !recency.accepts(item.published_at.as_ref(), now) {
                stats.stale += 1;
                counter!("relay_items_stale_total").increment(1);
                continue;
            }

            match dedup.admit(&item) {
                Admission::New => backlog.push(item),
                Admission::SeenThisCycle => {
                    stats.duplicates += 1;
                    counter!("relay_items_duplicate_total").increment(1);
                }
                Admission::AlreadySent => stats.already_sent += 1,
            }
        }
    }

    (backlog, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_decodes_and_collapses() {
        let s = "  <p>Harga&nbsp;&nbsp;naik <b>5%</b></p>\n\n hari ini.  ";
        assert_eq!(normalize_text(s), "Harga naik 5% hari ini.");
    }

    #[test]
    fn normalize_text_caps_length() {
        let long = "a".repeat(MAX_BODY_CHARS + 50);
        assert_eq!(normalize_text(&long).chars().count(), MAX_BODY_CHARS);
    }

    #[test]
    fn display_name_prefers_config_then_channel_then_path() {
        let named = FeedSpec::new("https://x.test/rss").with_name("The Star");
        assert_eq!(source_display_name(&named, Some("Other")), "The Star");

        let bare = FeedSpec::new("https://x.test/feeds/business/");
        assert_eq!(source_display_name(&bare, Some("Business &amp; Markets")), "Business & Markets");
        assert_eq!(source_display_name(&bare, None), "business");

        let host_only = FeedSpec::new("https://x.test/");
        assert_eq!(source_display_name(&host_only, None), "x.test");
    }
}
