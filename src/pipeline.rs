// src/pipeline.rs
//! One collection + dispatch cycle, and the leader-gated loop around it.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::analyze::summarize::{Provenance, Verifier};
use crate::analyze::Classifier;
use crate::dedup::Deduplicator;
use crate::error::RelayError;
use crate::ingest::article::{summarizer_content, ArticleReader};
use crate::ingest::normalize::ItemNormalizer;
use crate::ingest::recency::RecencyFilter;
use crate::ingest::types::{FeedSource, FeedSpec, NewsItem};
use crate::ingest::{collect_once, CollectStats};
use crate::leader::LeaderElector;
use crate::metrics::ensure_metrics_described;
use crate::notify::{compose_message, DispatchReport, Dispatcher, DisplayZone, OutboundMessage};
use crate::schedule::order_backlog;

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub max_per_cycle: usize,
    pub send_interval: Duration,
    pub zone: DisplayZone,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_per_cycle: 1,
            send_interval: Duration::from_secs(1),
            zone: DisplayZone::default(),
        }
    }
}

/// Everything a `Relay` is built from.
pub struct RelayParts {
    pub settings: RelaySettings,
    pub feeds: Vec<FeedSpec>,
    pub source: Arc<dyn FeedSource>,
    pub normalizer: ItemNormalizer,
    pub recency: RecencyFilter,
    pub dedup: Deduplicator,
    /// Set when article pages should be fetched for the summarizer.
    pub articles: Option<Arc<dyn ArticleReader>>,
    pub verifier: Verifier,
    pub classifier: Classifier,
    pub dispatcher: Dispatcher,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub collect: CollectStats,
    pub backlog: usize,
    /// Registry keys of items handed to the dispatcher, in send order.
    pub dispatched: Vec<String>,
    /// Items that reached no destination at all.
    pub undelivered: usize,
    pub regenerations: usize,
    pub fallbacks: usize,
    pub registry_error: bool,
}

pub struct Relay {
    settings: RelaySettings,
    feeds: Vec<FeedSpec>,
    source: Arc<dyn FeedSource>,
    normalizer: ItemNormalizer,
    recency: RecencyFilter,
    dedup: Deduplicator,
    articles: Option<Arc<dyn ArticleReader>>,
    verifier: Verifier,
    classifier: Classifier,
    dispatcher: Dispatcher,
}

impl Relay {
    pub fn new(parts: RelayParts) -> Self {
        let RelayParts {
            mut settings,
            feeds,
            source,
            normalizer,
            recency,
            dedup,
            articles,
            verifier,
            classifier,
            dispatcher,
        } = parts;
        settings.max_per_cycle = settings.max_per_cycle.max(1);
        Self {
            settings,
            feeds,
            source,
            normalizer,
            recency,
            dedup,
            articles,
            verifier,
            classifier,
            dispatcher,
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn registry_len(&self) -> usize {
        self.dedup.registry_len()
    }

    /// Run one cycle at `now`: collect, order, summarize, dispatch up to the cap, flush.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        ensure_metrics_described();
        let mut report = CycleReport::default();

        if let Err(e) = self.dedup.begin_cycle() {
            warn!(target: "dedup", error = %e, "registry reload failed; using in-memory state");
            counter!("relay_registry_errors_total").increment(1);
        }

        let (mut backlog, stats) = collect_once(
            &self.feeds,
            self.source.as_ref(),
            &self.normalizer,
            &self.recency,
            &mut self.dedup,
            now,
        )
        .await;
        report.collect = stats;
        order_backlog(&mut backlog);
        report.backlog = backlog.len();
        info!(target: "pipeline", backlog = backlog.len(), feeds = self.feeds.len(), "backlog collected");

        let total = backlog.len();
        for (i, mut item) in backlog.into_iter().enumerate() {
            if self.dedup.already_sent(&item) {
                continue;
            }

            let (msg, outcome) = self.prepare(&mut item).await;
            if outcome.regenerated {
                report.regenerations += 1;
            }
            if outcome.fallback {
                report.fallbacks += 1;
            }

            let delivery: DispatchReport = self.dispatcher.dispatch(&msg).await;
            if !delivery.any_delivered() {
                report.undelivered += 1;
            }
            // Recorded even when every destination failed: at-least-once, never a resend loop.
            self.dedup.mark_sent(&item);
            counter!("relay_items_dispatched_total").increment(1);
            debug!(
                target: "pipeline",
                id = %item.fingerprint().short(),
                delivered = delivery.delivered.len(),
                failed = delivery.failed.len(),
                "item dispatched"
            );
            report.dispatched.push(item.registry_key());

            if report.dispatched.len() >= self.settings.max_per_cycle {
                break;
            }
            if i + 1 < total && !self.settings.send_interval.is_zero() {
                tokio::time::sleep(self.settings.send_interval).await;
            }
        }

        if let Err(e) = self.dedup.flush() {
            warn!(target: "dedup", error = %e, "registry flush failed; will retry next cycle");
            counter!("relay_registry_errors_total").increment(1);
            report.registry_error = true;
        }

        gauge!("relay_last_cycle_ts").set(now.timestamp() as f64);
        info!(
            target: "pipeline",
            dispatched = report.dispatched.len(),
            stale = report.collect.stale,
            duplicates = report.collect.duplicates,
            already_sent = report.collect.already_sent,
            feeds_failed = report.collect.feeds_failed,
            "cycle finished"
        );
        report
    }

    /// Summarize, classify and format one item. Overwrites `item.title`/`item.body`.
    async fn prepare(&self, item: &mut NewsItem) -> (OutboundMessage, PrepOutcome) {
        let original_title = item.title.clone();

        let content = match (&self.articles, item.url.is_empty()) {
            (Some(reader), false) => match reader.read(&item.url).await {
                Ok(article) => {
                    if item.cover_url.is_none() {
                        item.cover_url = article.cover_url;
                    }
                    summarizer_content(&item.title, &item.body, &article.text)
                }
                Err(e) => {
                    debug!(target: "pipeline", error = %e, "article fetch failed; using feed excerpt");
                    summarizer_content(&item.title, &item.body, "")
                }
            },
            (Some(_), true) => summarizer_content(&item.title, &item.body, ""),
            (None, _) => item.body.clone(),
        };

        let verified = self.verifier.summarize(&item.title, &content, &item.body).await;
        let outcome = PrepOutcome {
            regenerated: verified.regenerated,
            fallback: verified.provenance == Provenance::Fallback && !self.verifier.chain().is_empty(),
        };
        item.title = verified.title;
        item.body = verified.summary;

        let category = self.classifier.classify(&original_title, &item.body);
        (compose_message(item, category, &self.settings.zone), outcome)
    }
}

struct PrepOutcome {
    regenerated: bool,
    fallback: bool,
}

/// Loop options for `run_leader_loop`.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub one_shot: bool,
    pub poll_interval: Duration,
    pub lease_backoff: Duration,
    pub heartbeat: Duration,
}

/// Run cycles while holding the lease until `shutdown` resolves (or after one cycle in one-shot mode).
/// The lease is renewed at the start of every cycle and while idle between cycles.
pub async fn run_leader_loop<F>(
    relay: &mut Relay,
    elector: &mut LeaderElector,
    opts: &LoopOptions,
    shutdown: F,
) where
    F: std::future::Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        match elector.ensure(Utc::now().timestamp()) {
            Ok(()) => {
                let report = tokio::select! {
                    r = relay.run_cycle(Utc::now()) => Some(r),
                    _ = &mut shutdown => None,
                };
                if report.is_none() {
                    break;
                }
                if opts.one_shot {
                    break;
                }
                let idle = idle_with_heartbeat(elector, opts.poll_interval, opts.heartbeat);
                tokio::select! {
                    _ = idle => {}
                    _ = &mut shutdown => break,
                }
            }
            Err(RelayError::LeaseConflict { holder, age_secs }) => {
                info!(target: "leader", %holder, age_secs, "another runner is active; standing by");
                if opts.one_shot {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(opts.lease_backoff) => {}
                    _ = &mut shutdown => break,
                }
            }
            Err(e) => {
                warn!(target: "leader", error = %e, "lease check failed");
                if opts.one_shot {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(opts.lease_backoff) => {}
                    _ = &mut shutdown => break,
                }
            }
        }
    }

    if let Err(e) = elector.release() {
        warn!(target: "leader", error = %e, "lease release failed");
    }
}

async fn idle_with_heartbeat(elector: &mut LeaderElector, total: Duration, heartbeat: Duration) {
    let heartbeat = heartbeat.max(Duration::from_secs(1));
    let mut remaining = total;
    while !remaining.is_zero() {
        let step = remaining.min(heartbeat);
        tokio::time::sleep(step).await;
        remaining -= step;
        if elector.is_leader() {
            if let Err(e) = elector.renew(Utc::now().timestamp()) {
                warn!(target: "leader", error = %e, "heartbeat renewal failed");
            }
        }
    }
}
