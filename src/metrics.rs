// src/metrics.rs
use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_feed_errors_total", "Feed fetch/parse failures.");
        describe_counter!("relay_entries_total", "Feed entries seen.");
        describe_counter!(
            "relay_entries_malformed_total",
            "Feed entries skipped because they could not be read."
        );
        describe_counter!("relay_items_stale_total", "Items rejected by the recency window.");
        describe_counter!(
            "relay_items_duplicate_total",
            "Items collapsed by the in-run fingerprint set."
        );
        describe_counter!("relay_items_dispatched_total", "Items handed to the dispatcher.");
        describe_counter!(
            "relay_dispatch_failures_total",
            "Per-destination delivery failures."
        );
        describe_counter!(
            "relay_fact_regenerations_total",
            "Summaries regenerated because of ungrounded numbers."
        );
        describe_counter!(
            "relay_summary_fallbacks_total",
            "Summaries produced by truncation after every provider failed."
        );
        describe_counter!("relay_registry_errors_total", "Sent-registry I/O failures.");
        describe_histogram!("relay_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("relay_last_cycle_ts", "Unix ts when the last cycle finished.");
        describe_gauge!("relay_is_leader", "1 while this runner holds the lease.");
    });
}

/// Install the global Prometheus recorder with an HTTP listener on `addr`.
pub fn install_prometheus(addr: &str) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid metrics address {addr}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install exporter")?;
    ensure_metrics_described();
    Ok(())
}

/// Install the global recorder without a listener; render through the handle.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")?;
    ensure_metrics_described();
    Ok(handle)
}
