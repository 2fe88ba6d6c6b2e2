// tests/ingest_recency.rs
use chrono::{DateTime, TimeZone, Utc};
use news_relay::ingest::parse::parse_timestamp;
use news_relay::ingest::recency::{Freshness, RecencyFilter};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 14, 12, 0, 0).unwrap()
}

fn classify(raw: &str) -> Freshness {
    let ts = parse_timestamp(raw);
    assert!(ts.is_some(), "unparsed timestamp {raw}");
    RecencyFilter::from_hours(6).classify(ts.as_ref(), now())
}

#[test]
fn window_edge_is_inclusive() {
    assert_eq!(classify("Tue, 14 Oct 2025 06:00:00 +0000"), Freshness::Fresh);
    assert_eq!(classify("Tue, 14 Oct 2025 05:59:59 +0000"), Freshness::Stale);
}

#[test]
fn offsets_are_respected() {
    // 14:00 +08:00 is 06:00 UTC
    assert_eq!(classify("2025-10-14T14:00:00+08:00"), Freshness::Fresh);
    assert_eq!(classify("2025-10-14T13:59:00+08:00"), Freshness::Stale);
}

#[test]
fn naive_timestamps_are_utc() {
    assert_eq!(classify("2025-10-14 08:00:00"), Freshness::Fresh);
    assert_eq!(classify("2025-10-14 05:00"), Freshness::Stale);
}

#[test]
fn future_items_are_rejected() {
    assert_eq!(classify("2025-10-14T12:30:00Z"), Freshness::Future);
    assert_eq!(classify("2026-01-01T00:00:00Z"), Freshness::FutureYear);
    assert!(!Freshness::Future.accepted());
    assert!(!Freshness::FutureYear.accepted());
}

#[test]
fn unparseable_dates_count_as_undated() {
    let f = RecencyFilter::from_hours(6);
    let ts = parse_timestamp("sometime last week");
    assert!(ts.is_none());
    assert_eq!(f.classify(ts.as_ref(), now()), Freshness::Undated);
    assert!(f.accepts(None, now()));
}
