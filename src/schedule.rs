// src/schedule.rs
//! Send order for the cycle backlog.
use std::cmp::Ordering;

use crate::ingest::types::NewsItem;

/// Privileged feeds first, then newest first; undated items sort as oldest.
/// Stable, so ties keep discovery order.
pub fn order_backlog(items: &mut [NewsItem]) {
    items.sort_by(send_order);
}

pub fn send_order(a: &NewsItem, b: &NewsItem) -> Ordering {
    b.priority.cmp(&a.priority).then_with(|| match (&a.published_at, &b.published_at) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}
