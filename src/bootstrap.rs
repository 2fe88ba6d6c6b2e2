// src/bootstrap.rs
//! Wire a `Relay` and its `LeaderElector` from `RelayConfig`.
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::analyze::ai_adapter::ChatCompletionProvider;
use crate::analyze::summarize::{FirstSuccess, Summarizer, Verifier};
use crate::analyze::Classifier;
use crate::config::RelayConfig;
use crate::dedup::registry::SentRegistry;
use crate::dedup::Deduplicator;
use crate::ingest::article::{ArticleReader, HttpArticleReader};
use crate::ingest::normalize::{HttpResolver, ItemNormalizer, NoopResolver, UrlResolver};
use crate::ingest::providers::HttpFeedSource;
use crate::ingest::recency::RecencyFilter;
use crate::leader::{FileLeaseStore, LeaderElector, LeaseStore, MemoryLeaseStore};
use crate::notify::{build_notifiers, Dispatcher, DisplayZone};
use crate::pipeline::{LoopOptions, Relay, RelayParts, RelaySettings};

/// Summarizer chain in config order. Providers without credentials are skipped.
pub fn build_summarizers(cfg: &RelayConfig) -> Vec<Arc<dyn Summarizer>> {
    if !cfg.use_ai_summary {
        return Vec::new();
    }
    let timeout = Duration::from_secs(cfg.ai.timeout_secs);
    let mut out: Vec<Arc<dyn Summarizer>> = Vec::new();
    for p in &cfg.ai.providers {
        match ChatCompletionProvider::from_config(p, timeout) {
            Ok(provider) => {
                info!(target: "summarize", provider = %p.name, model = %p.model, "summary provider enabled");
                out.push(Arc::new(provider));
            }
            Err(e) => warn!(target: "summarize", provider = %p.name, error = %e, "summary provider disabled"),
        }
    }
    if out.is_empty() {
        warn!(target: "summarize", "no summary provider available; using excerpt fallback");
    }
    out
}

fn build_classifier(cfg: &RelayConfig) -> Classifier {
    match &cfg.categories_path {
        Some(path) => match Classifier::from_path(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(target: "classify", path = %path.display(), error = %e, "category rules unreadable; using built-in rules");
                Classifier::builtin().clone()
            }
        },
        None => Classifier::builtin().clone(),
    }
}

/// Build the relay. Fails only when an HTTP client cannot be constructed.
pub fn build_relay(cfg: &RelayConfig) -> anyhow::Result<Relay> {
    let http_timeout = cfg.http_timeout();

    let resolver: Arc<dyn UrlResolver> = if cfg.resolve_wrappers {
        Arc::new(HttpResolver::new(http_timeout)?)
    } else {
        Arc::new(NoopResolver)
    };
    let mut normalizer = ItemNormalizer::new(resolver);
    if let Some(hosts) = &cfg.wrapper_hosts {
        normalizer = normalizer.with_wrapper_hosts(hosts.iter().cloned());
    }

    let summarizers = build_summarizers(cfg);
    let articles: Option<Arc<dyn ArticleReader>> = if summarizers.is_empty() {
        None
    } else {
        Some(Arc::new(HttpArticleReader::new(Duration::from_secs(cfg.article_timeout_secs))?))
    };
    let verifier = Verifier::new(FirstSuccess::new(summarizers)).with_max_prompt_facts(cfg.ai.max_prompt_facts);

    let registry = SentRegistry::open_or_empty(&cfg.registry_path);
    let dispatcher = Dispatcher::new(build_notifiers(&cfg.destinations, http_timeout));
    info!(
        target: "dispatch",
        destinations = ?dispatcher.destinations(),
        feeds = cfg.feeds.len(),
        "relay configured"
    );

    Ok(Relay::new(RelayParts {
        settings: RelaySettings {
            max_per_cycle: cfg.max_per_cycle,
            send_interval: cfg.send_interval(),
            zone: DisplayZone::new(cfg.display.utc_offset_hours, cfg.display.zone_label.clone()),
        },
        feeds: cfg.feeds.clone(),
        source: Arc::new(HttpFeedSource::new(http_timeout)?),
        normalizer,
        recency: RecencyFilter::from_hours(cfg.freshness_hours),
        dedup: Deduplicator::new(Box::new(registry)),
        articles,
        verifier,
        classifier: build_classifier(cfg),
        dispatcher,
    }))
}

/// File-backed elector; with the lease disabled, a private in-memory lease that is always ours.
pub fn build_elector(cfg: &RelayConfig) -> LeaderElector {
    let store: Box<dyn LeaseStore> = if cfg.lease.enabled {
        Box::new(FileLeaseStore::new(cfg.lease.path.clone()))
    } else {
        info!(target: "leader", "lease disabled; running as sole instance");
        Box::new(MemoryLeaseStore::new())
    };
    LeaderElector::new(store, cfg.owner_id(), Duration::from_secs(cfg.lease.stale_after_secs))
}

pub fn loop_options(cfg: &RelayConfig) -> LoopOptions {
    LoopOptions {
        one_shot: cfg.one_shot,
        poll_interval: cfg.poll_interval(),
        lease_backoff: Duration::from_secs(cfg.lease.poll_backoff_secs),
        heartbeat: Duration::from_secs(cfg.lease.heartbeat_secs),
    }
}
