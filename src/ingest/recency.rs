// src/ingest/recency.rs
use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No usable timestamp; accepted.
    Undated,
    Fresh,
    Stale,
    Future,
    /// Year later than the current one; feeds with broken clocks.
    FutureYear,
}

impl Freshness {
    pub fn accepted(self) -> bool {
        matches!(self, Freshness::Undated | Freshness::Fresh)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyFilter {
    window: Duration,
}

impl RecencyFilter {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_hours(hours: u32) -> Self {
        Self::new(Duration::hours(i64::from(hours)))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn classify(&self, published: Option<&DateTime<FixedOffset>>, now: DateTime<Utc>) -> Freshness {
        let Some(ts) = published else {
            return Freshness::Undated;
        };
        let ts = ts.with_timezone(&Utc);
        if ts.year() > now.year() {
            return Freshness::FutureYear;
        }
        if ts > now {
            return Freshness::Future;
        }
        if now - ts <= self.window {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }

    pub fn accepts(&self, published: Option<&DateTime<FixedOffset>>, now: DateTime<Utc>) -> bool {
        self.classify(published, now).accepted()
    }
}
