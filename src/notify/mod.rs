// src/notify/mod.rs
pub mod discord;
pub mod email;
pub mod feishu;
pub mod log;
pub mod slack;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};
use metrics::counter;
use tracing::{info, warn};

use crate::analyze::Category;
use crate::config::DestinationConfig;
use crate::error::Result;
use crate::ingest::types::NewsItem;

pub use discord::DiscordNotifier;
pub use email::EmailNotifier;
pub use feishu::{FeishuAppNotifier, FeishuNotifier};
pub use log::LogNotifier;
pub use slack::SlackNotifier;

/// One formatted item, ready for any channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// `【label】title`
    pub title: String,
    /// Markdown-ish body ending with the source link line.
    pub body: String,
    pub link: String,
    pub cover_url: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Destination label for logs and reports, e.g. `feishu`.
    fn destination(&self) -> &str;
    async fn send(&self, msg: &OutboundMessage) -> Result<()>;
}

/// Timestamp rendering for message bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayZone {
    pub offset: FixedOffset,
    pub label: String,
}

impl Default for DisplayZone {
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(8 * 3600).unwrap_or(Utc.fix()),
            label: "MYT".to_string(),
        }
    }
}

impl DisplayZone {
    pub fn new(offset_hours: i32, label: impl Into<String>) -> Self {
        let offset = FixedOffset::east_opt(offset_hours.clamp(-23, 23) * 3600)
            .unwrap_or_else(|| DisplayZone::default().offset);
        Self {
            offset,
            label: label.into(),
        }
    }
}

/// Build the outbound message for an item whose title/body already hold the summary.
pub fn compose_message(item: &NewsItem, category: Category, zone: &DisplayZone) -> OutboundMessage {
    let mut body = item.body.trim().to_string();
    body.push_str("\n\n");
    if let Some(ts) = item.published_at {
        let local = ts.with_timezone(&zone.offset);
        body.push_str(&format!("⏰ {} ({})\n", local.format("%Y-%m-%d %H:%M"), zone.label));
    }
    if item.url.is_empty() {
        body.push_str(&format!("来源：{}", item.source));
    } else {
        body.push_str(&format!("来源：[{}]({})", item.source, item.url));
    }

    OutboundMessage {
        title: format!("【{}】{}", category.label(), item.title),
        body,
        link: item.url.clone(),
        cover_url: item.cover_url.clone(),
    }
}

/// Per-item outcome across all destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    /// `(destination, error)`
    pub failed: Vec<(String, String)>,
}

impl DispatchReport {
    pub fn any_delivered(&self) -> bool {
        !self.delivered.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Fans one message out to every channel; a failing channel never blocks the others.
pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn destinations(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.destination().to_string()).collect()
    }

    pub async fn dispatch(&self, msg: &OutboundMessage) -> DispatchReport {
        let mut report = DispatchReport::default();
        for ch in &self.channels {
            match ch.send(msg).await {
                Ok(()) => {
                    info!(target: "dispatch", destination = ch.destination(), title = %msg.title, "delivered");
                    report.delivered.push(ch.destination().to_string());
                }
                Err(e) => {
                    warn!(target: "dispatch", destination = ch.destination(), error = %e, "delivery failed; continuing");
                    counter!("relay_dispatch_failures_total").increment(1);
                    report.failed.push((ch.destination().to_string(), e.to_string()));
                }
            }
        }
        report
    }
}

/// Channels from config. Destinations that cannot be built are logged and skipped;
/// with none left the dry-run log channel is used.
pub fn build_notifiers(destinations: &[DestinationConfig], timeout: Duration) -> Vec<Box<dyn Notifier>> {
    let mut out: Vec<Box<dyn Notifier>> = Vec::new();
    for d in destinations {
        let built: Result<Box<dyn Notifier>> = match d {
            DestinationConfig::Feishu { webhook, secret } => {
                FeishuNotifier::new(webhook.clone(), secret.clone(), timeout).map(|n| Box::new(n) as Box<dyn Notifier>)
            }
            DestinationConfig::FeishuApp {
                chat_id,
                api_base,
                app_id_env,
                app_secret_env,
            } => FeishuAppNotifier::from_env(api_base, app_id_env, app_secret_env, chat_id, timeout)
                .map(|n| Box::new(n) as Box<dyn Notifier>),
            DestinationConfig::Discord { webhook } => DiscordNotifier::new(webhook.clone(), timeout)
                .map(|n| Box::new(n.with_retries(3)) as Box<dyn Notifier>),
            DestinationConfig::Slack { webhook } => {
                SlackNotifier::new(webhook.clone(), timeout).map(|n| Box::new(n) as Box<dyn Notifier>)
            }
            DestinationConfig::Email(cfg) => EmailNotifier::from_config(cfg).map(|n| Box::new(n) as Box<dyn Notifier>),
            DestinationConfig::Log => Ok(Box::new(LogNotifier::new())),
        };
        match built {
            Ok(n) => out.push(n),
            Err(e) => warn!(target: "dispatch", destination = d.kind(), error = %e, "destination disabled"),
        }
    }
    if out.is_empty() {
        info!(target: "dispatch", "no destinations configured; running in dry-run mode");
        out.push(Box::new(LogNotifier::new()));
    }
    out
}
