// src/ingest/parse.rs
//! RSS 2.0 / RSS 1.0 (RDF) / Atom documents into `ParsedFeed`, plus lenient timestamp parsing.
//!
//! Documents are walked event by event so namespaced extensions (`dc:date`,
//! `content:encoded`, `media:content`) are read by local name, and one broken
//! entry is dropped without losing its siblings.
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::error::{RelayError, Result};
use crate::ingest::types::{ParsedFeed, RawEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Rss,
    Atom,
}

impl Dialect {
    fn from_root(local: &[u8]) -> Option<Self> {
        match local {
            b"rss" | b"RDF" => Some(Self::Rss),
            b"feed" => Some(Self::Atom),
            _ => None,
        }
    }

    fn entry_tag(self) -> &'static [u8] {
        match self {
            Self::Rss => b"item",
            Self::Atom => b"entry",
        }
    }
}

/// Text-bearing child of an entry (or the feed title).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    FeedTitle,
    Title,
    Link,
    Summary,
    Encoded,
    Content,
    PubDate,
    DcDate,
    Published,
    Updated,
}

#[derive(Debug)]
struct LinkRef {
    href: String,
    rel: Option<String>,
    kind: Option<String>,
}

#[derive(Debug)]
struct MediaRef {
    url: String,
    kind: Option<String>,
}

#[derive(Debug, Default)]
struct EntryDraft {
    title: Option<String>,
    link: Option<String>,
    summary: Option<String>,
    encoded: Option<String>,
    content: Option<String>,
    pub_date: Option<String>,
    dc_date: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    links: Vec<LinkRef>,
    media: Vec<MediaRef>,
    defect: Option<&'static str>,
}

impl EntryDraft {
    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::FeedTitle => return,
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Summary => &mut self.summary,
            Field::Encoded => &mut self.encoded,
            Field::Content => &mut self.content,
            Field::PubDate => &mut self.pub_date,
            Field::DcDate => &mut self.dc_date,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
        };
        if slot.is_some() {
            match field {
                Field::Title => self.defect = Some("duplicate title"),
                Field::Link => self.defect = Some("duplicate link"),
                _ => {}
            }
            return;
        }
        *slot = Some(value);
    }

    /// Direct child opened. Returns the field whose text should be captured;
    /// attribute-only elements are recorded here.
    fn open_child(&mut self, e: &BytesStart<'_>) -> Option<Field> {
        let prefixed = e.name().prefix().is_some();
        match e.local_name().as_ref() {
            b"title" => Some(Field::Title),
            b"link" => match attr(e, "href") {
                Some(href) => {
                    self.links.push(LinkRef {
                        href,
                        rel: attr(e, "rel"),
                        kind: attr(e, "type"),
                    });
                    None
                }
                None => Some(Field::Link),
            },
            b"description" | b"summary" => Some(Field::Summary),
            b"encoded" => Some(Field::Encoded),
            b"content" | b"thumbnail" if prefixed => {
                self.push_media(e, "url");
                None
            }
            b"content" => Some(Field::Content),
            b"enclosure" => {
                self.push_media(e, "url");
                None
            }
            b"pubDate" => Some(Field::PubDate),
            b"date" => Some(Field::DcDate),
            b"published" | b"issued" => Some(Field::Published),
            b"updated" | b"modified" => Some(Field::Updated),
            _ => None,
        }
    }

    /// Media references nested deeper, e.g. inside `media:group`.
    fn open_nested(&mut self, e: &BytesStart<'_>) {
        if e.name().prefix().is_some() && matches!(e.local_name().as_ref(), b"content" | b"thumbnail") {
            self.push_media(e, "url");
        }
    }

    fn push_media(&mut self, e: &BytesStart<'_>, url_attr: &str) {
        if let Some(url) = attr(e, url_attr) {
            self.media.push(MediaRef {
                url,
                kind: attr(e, "type"),
            });
        }
    }

    fn finish(self) -> RawEntry {
        let link = self.link.filter(|l| !l.is_empty()).or_else(|| {
            self.links
                .iter()
                .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
                .or_else(|| self.links.first())
                .map(|l| l.href.clone())
        });
        let enclosures = self
            .links
            .iter()
            .filter(|l| l.rel.as_deref() == Some("enclosure"))
            .map(|l| (l.href.as_str(), l.kind.as_deref()));
        let media_url = self
            .media
            .iter()
            .map(|m| (m.url.as_str(), m.kind.as_deref()))
            .chain(enclosures)
            .find(|(_, kind)| kind.map_or(true, |k| k.starts_with("image")))
            .map(|(url, _)| url.to_string());

        RawEntry {
            title: self.title,
            link,
            summary: non_empty(self.summary)
                .or_else(|| non_empty(self.encoded))
                .or_else(|| non_empty(self.content)),
            published: non_empty(self.pub_date)
                .or_else(|| non_empty(self.published))
                .or_else(|| non_empty(self.dc_date)),
            updated: non_empty(self.updated),
            media_url,
        }
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.is_empty())
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
        .filter(|v| !v.is_empty())
}

fn text_of(t: &BytesText<'_>) -> String {
    match t.unescape() {
        Ok(s) => s.into_owned(),
        Err(_) => String::from_utf8_lossy(t).into_owned(),
    }
}

fn not_a_feed(root: &[u8]) -> RelayError {
    RelayError::Parse(format!("not a feed: root element <{}>", String::from_utf8_lossy(root)))
}

/// Element whose text is being collected, with its depth.
struct Capture {
    depth: usize,
    field: Field,
    buf: String,
}

/// Parse a feed document. The root element picks the dialect; anything else is a parse error.
pub fn parse_feed(xml: &str) -> Result<ParsedFeed> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let mut reader = Reader::from_str(&xml_clean);

    let mut dialect: Option<Dialect> = None;
    // Local names of open elements, root first.
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut entry: Option<(usize, EntryDraft)> = None;
    let mut capture: Option<Capture> = None;
    let mut feed = ParsedFeed::default();
    let mut skipped = 0usize;

    loop {
        let event = match reader.read_event() {
            Ok(ev) => ev,
            Err(e) => {
                if dialect.is_none() {
                    return Err(RelayError::Parse(format!("not an XML feed: {e}")));
                }
                if feed.entries.is_empty() {
                    return Err(RelayError::Parse(format!(
                        "malformed feed at byte {}: {e}",
                        reader.buffer_position()
                    )));
                }
                warn!(
                    target: "ingest",
                    error = %e,
                    kept = feed.entries.len(),
                    "feed document broken part-way; keeping complete entries"
                );
                break;
            }
        };

        match event {
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                let Some(d) = dialect else {
                    dialect = Some(Dialect::from_root(&local).ok_or_else(|| not_a_feed(&local))?);
                    stack.push(local);
                    continue;
                };
                let depth = stack.len() + 1;
                match entry.as_mut() {
                    Some((entry_depth, draft)) => {
                        if capture.is_none() {
                            if depth == *entry_depth + 1 {
                                capture = draft.open_child(&e).map(|field| Capture {
                                    depth,
                                    field,
                                    buf: String::new(),
                                });
                            } else {
                                draft.open_nested(&e);
                            }
                        }
                    }
                    None if depth <= 3 && local.as_slice() == d.entry_tag() => {
                        entry = Some((depth, EntryDraft::default()));
                    }
                    None if capture.is_none() && feed.title.is_none() && local.as_slice() == b"title" => {
                        let parent = stack.last().map(Vec::as_slice);
                        let feed_level = match d {
                            Dialect::Rss => depth == 3 && parent == Some(b"channel".as_slice()),
                            Dialect::Atom => depth == 2,
                        };
                        if feed_level {
                            capture = Some(Capture {
                                depth,
                                field: Field::FeedTitle,
                                buf: String::new(),
                            });
                        }
                    }
                    None => {}
                }
                stack.push(local);
            }
            Event::Empty(e) => {
                if dialect.is_none() {
                    return Err(not_a_feed(e.local_name().as_ref()));
                }
                if let (Some((entry_depth, draft)), None) = (entry.as_mut(), capture.as_ref()) {
                    if stack.len() == *entry_depth {
                        let _ = draft.open_child(&e);
                    } else {
                        draft.open_nested(&e);
                    }
                }
            }
            Event::Text(t) => {
                if let Some(c) = capture.as_mut() {
                    c.buf.push_str(&text_of(&t));
                }
            }
            Event::CData(t) => {
                if let Some(c) = capture.as_mut() {
                    c.buf.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::End(_) => {
                let depth = stack.len();
                if capture.as_ref().is_some_and(|c| c.depth == depth) {
                    if let Some(c) = capture.take() {
                        let value = c.buf.trim().to_string();
                        match (c.field, entry.as_mut()) {
                            (Field::FeedTitle, _) => feed.title = Some(value).filter(|v| !v.is_empty()),
                            (field, Some((_, draft))) => draft.set(field, value),
                            (_, None) => {}
                        }
                    }
                }
                if entry.as_ref().is_some_and(|(d, _)| *d == depth) {
                    if let Some((_, draft)) = entry.take() {
                        match draft.defect {
                            Some(defect) => {
                                skipped += 1;
                                debug!(target: "ingest", defect, title = ?draft.title, "malformed entry skipped");
                            }
                            None => feed.entries.push(draft.finish()),
                        }
                    }
                }
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if dialect.is_none() {
        return Err(RelayError::Parse("empty document".into()));
    }
    if skipped > 0 {
        counter!("relay_entries_malformed_total").increment(skipped as u64);
    }
    histogram!("relay_feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(feed)
}

/// quick-xml only knows the five XML entities; feeds routinely carry HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Parse a feed timestamp. RFC 2822, RFC 3339, a few common variants; naive forms are taken as UTC.
/// Anything else is `None` (which the recency filter accepts).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn timestamp_formats() {
        let a = parse_timestamp("Tue, 14 Oct 2025 08:30:00 +0800").unwrap();
        assert_eq!(a.with_timezone(&Utc).hour(), 0);

        let b = parse_timestamp("2025-10-14T08:30:00Z").unwrap();
        assert_eq!(b.hour(), 8);

        let c = parse_timestamp("2025-10-14 08:30:00").unwrap();
        assert_eq!(c.offset().local_minus_utc(), 0);

        let d = parse_timestamp("2025-10-14").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2025, 10, 14));

        assert!(parse_timestamp("yesterday-ish").is_none());
        assert!(parse_timestamp("  ").is_none());
    }

    #[test]
    fn namespaced_extensions_are_read() {
        let xml = r#"<rss version="2.0"
              xmlns:dc="http://purl.org/dc/elements/1.1/"
              xmlns:content="http://purl.org/rss/1.0/modules/content/"
              xmlns:media="http://search.yahoo.com/mrss/">
            <channel><title>T</title>
              <item>
                <title>A</title><link>https://x.test/a</link>
                <dc:date>2025-10-14T10:00:00Z</dc:date>
                <content:encoded><![CDATA[<p>Body here</p>]]></content:encoded>
                <media:group><media:content url="https://cdn.x.test/a.jpg" medium="image"/></media:group>
              </item>
            </channel></rss>"#;
        let feed = parse_feed(xml).unwrap();
        let e = &feed.entries[0];
        assert_eq!(e.published.as_deref(), Some("2025-10-14T10:00:00Z"));
        assert_eq!(e.summary.as_deref(), Some("<p>Body here</p>"));
        assert_eq!(e.media_url.as_deref(), Some("https://cdn.x.test/a.jpg"));
    }

    #[test]
    fn rdf_items_sit_beside_the_channel() {
        let xml = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/">
            <channel><title>R</title></channel>
            <item><title>One</title><link>https://r.test/1</link></item>
        </rdf:RDF>"#;
        let feed = parse_feed(xml).unwrap();
        assert_eq!(feed.title.as_deref(), Some("R"));
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].link.as_deref(), Some("https://r.test/1"));
    }

    #[test]
    fn non_feed_documents_are_parse_errors() {
        for doc in [
            "<html><head><title>Blocked</title></head><body>captcha</body></html>",
            "<!DOCTYPE html><html><body><p>oops</p></body></html>",
            "Service Unavailable",
            "",
        ] {
            let err = parse_feed(doc).unwrap_err();
            assert!(matches!(err, RelayError::Parse(_)), "{doc:?} gave {err:?}");
        }
    }

    #[test]
    fn broken_item_is_skipped_alone() {
        let xml = r#"<rss><channel><title>T</title>
            <item><title>Good</title><link>https://x.test/good</link></item>
            <item><title>One</title><title>Two</title><link>https://x.test/bad</link></item>
            <item><title>Also good</title><link>https://x.test/also</link></item>
        </channel></rss>"#;
        let feed = parse_feed(xml).unwrap();
        let titles: Vec<_> = feed.entries.iter().filter_map(|e| e.title.as_deref()).collect();
        assert_eq!(titles, vec!["Good", "Also good"]);
    }

    #[test]
    fn truncated_document_keeps_complete_entries() {
        let xml = r#"<rss><channel><title>T</title>
            <item><title>Whole</title><link>https://x.test/w</link></item>
            <item><title>Cut</title></link>"#;
        let feed = parse_feed(xml).unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert!(parse_feed("<rss><channel><item><title>x</wrong>").is_err());
    }

    #[test]
    fn atom_alternate_link_wins() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>A</title>
            <entry><title>E</title>
              <link rel="self" href="https://a.test/self"/>
              <link rel="alternate" href="https://a.test/e"/>
              <link rel="enclosure" type="image/png" href="https://a.test/e.png"/>
              <updated>2025-10-14T01:00:00Z</updated>
              <content type="html">&lt;p&gt;Hi&lt;/p&gt;</content>
            </entry></feed>"#;
        let feed = parse_feed(xml).unwrap();
        let e = &feed.entries[0];
        assert_eq!(e.link.as_deref(), Some("https://a.test/e"));
        assert_eq!(e.media_url.as_deref(), Some("https://a.test/e.png"));
        assert_eq!(e.summary.as_deref(), Some("<p>Hi</p>"));
        assert_eq!(e.updated.as_deref(), Some("2025-10-14T01:00:00Z"));
        assert!(e.published.is_none());
    }

    #[test]
    fn html_entities_do_not_break_xml() {
        let xml = r#"<rss><channel><title>T</title>
            <item><title>A&nbsp;B &mdash; C</title><link>https://x.test/a</link></item>
        </channel></rss>"#;
        let feed = parse_feed(xml).unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].title.as_deref(), Some("A B - C"));
    }
}
