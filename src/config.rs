// src/config.rs
//! Relay configuration: TOML file plus environment overrides.
//!
//! Lookup: `$RELAY_CONFIG_PATH`, else `config/relay.toml`; a missing default file
//! means built-in defaults.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ingest::types::FeedSpec;

const ENV_PATH: &str = "RELAY_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/relay.toml";
const WEBHOOK_PLACEHOLDER: &str = "your_webhook_url_here";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub freshness_hours: u32,
    pub max_per_cycle: usize,
    pub send_interval_secs: f64,
    pub poll_interval_secs: u64,
    pub one_shot: bool,
    pub use_ai_summary: bool,
    pub registry_path: PathBuf,
    pub http_timeout_secs: u64,
    pub article_timeout_secs: u64,
    /// Follow redirects of known wrapper hosts to find the real article URL.
    pub resolve_wrappers: bool,
    pub wrapper_hosts: Option<Vec<String>>,
    pub categories_path: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub feeds: Vec<FeedSpec>,
    pub destinations: Vec<DestinationConfig>,
    pub lease: LeaseConfig,
    pub ai: AiConfig,
    pub display: DisplayConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            freshness_hours: 6,
            max_per_cycle: 1,
            send_interval_secs: 1.0,
            poll_interval_secs: 600,
            one_shot: false,
            use_ai_summary: false,
            registry_path: PathBuf::from("sent_news.txt"),
            http_timeout_secs: 15,
            article_timeout_secs: 20,
            resolve_wrappers: true,
            wrapper_hosts: None,
            categories_path: None,
            metrics_addr: None,
            feeds: Vec::new(),
            destinations: Vec::new(),
            lease: LeaseConfig::default(),
            ai: AiConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DestinationConfig {
    Feishu {
        webhook: String,
        #[serde(default)]
        secret: Option<String>,
    },
    /// Feishu app bot: tenant token from app credentials, card posted to a chat.
    #[serde(rename = "feishu_app")]
    FeishuApp {
        chat_id: String,
        #[serde(default = "default_feishu_api_base")]
        api_base: String,
        #[serde(default = "default_feishu_app_id_env")]
        app_id_env: String,
        #[serde(default = "default_feishu_app_secret_env")]
        app_secret_env: String,
    },
    Discord {
        webhook: String,
    },
    Slack {
        webhook: String,
    },
    Email(EmailConfig),
    /// Dry run: log instead of sending.
    Log,
}

impl DestinationConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            DestinationConfig::Feishu { .. } => "feishu",
            DestinationConfig::FeishuApp { .. } => "feishu_app",
            DestinationConfig::Discord { .. } => "discord",
            DestinationConfig::Slack { .. } => "slack",
            DestinationConfig::Email(_) => "email",
            DestinationConfig::Log => "log",
        }
    }

    /// Where messages land: the webhook URL, or the chat id for app delivery.
    fn target(&self) -> Option<&str> {
        match self {
            DestinationConfig::Feishu { webhook, .. }
            | DestinationConfig::Discord { webhook }
            | DestinationConfig::Slack { webhook } => Some(webhook.as_str()),
            DestinationConfig::FeishuApp { chat_id, .. } => Some(chat_id.as_str()),
            _ => None,
        }
    }
}

fn default_feishu_api_base() -> String {
    "https://open.feishu.cn".into()
}

fn default_feishu_app_id_env() -> String {
    "FEISHU_APP_ID".into()
}

fn default_feishu_app_secret_env() -> String {
    "FEISHU_APP_SECRET".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub from: String,
    pub to: String,
    #[serde(default = "default_smtp_user_env")]
    pub user_env: String,
    #[serde(default = "default_smtp_pass_env")]
    pub pass_env: String,
}

fn default_smtp_user_env() -> String {
    "SMTP_USER".into()
}

fn default_smtp_pass_env() -> String {
    "SMTP_PASS".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LeaseConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub stale_after_secs: u64,
    pub poll_backoff_secs: u64,
    /// Renewal period while idle between cycles.
    pub heartbeat_secs: u64,
    pub owner_id: Option<String>,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("relay.lease"),
            stale_after_secs: 300,
            poll_backoff_secs: 30,
            heartbeat_secs: 60,
            owner_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AiConfig {
    pub timeout_secs: u64,
    pub max_prompt_facts: usize,
    pub providers: Vec<AiProviderConfig>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_prompt_facts: crate::analyze::facts::MAX_PROMPT_FACTS,
            providers: vec![
                AiProviderConfig {
                    name: "deepseek".into(),
                    endpoint: "https://api.deepseek.com/v1/chat/completions".into(),
                    model: "deepseek-chat".into(),
                    api_key_env: "DEEPSEEK_API_KEY".into(),
                    temperature: default_temperature(),
                    max_tokens: default_max_tokens(),
                },
                AiProviderConfig {
                    name: "openai".into(),
                    endpoint: "https://api.openai.com/v1/chat/completions".into(),
                    model: "gpt-4o-mini".into(),
                    api_key_env: "OPENAI_API_KEY".into(),
                    temperature: default_temperature(),
                    max_tokens: default_max_tokens(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiProviderConfig {
    pub name: String,
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    pub utc_offset_hours: i32,
    pub zone_label: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 8,
            zone_label: "MYT".into(),
        }
    }
}

impl RelayConfig {
    /// Load from `$RELAY_CONFIG_PATH` / `config/relay.toml`, apply env overrides, sanitize.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_PATH) {
            Ok(p) => {
                let path = PathBuf::from(p);
                if !path.exists() {
                    return Err(anyhow!("{ENV_PATH} points to non-existent path {}", path.display()));
                }
                Self::from_path(&path)?
            }
            Err(_) => {
                let path = PathBuf::from(DEFAULT_PATH);
                if path.exists() {
                    Self::from_path(&path)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides(|k| std::env::var(k).ok());
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading relay config from {}", path.display()))?;
        Self::from_toml_str(&s).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Apply the environment overrides, reading variables through `get`.
    pub fn apply_env_overrides<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = var("FRESHNESS_HOURS").and_then(|v| v.parse().ok()) {
            self.freshness_hours = v;
        }
        if let Some(v) = var("MAX_PUSH_PER_CYCLE").and_then(|v| v.parse().ok()) {
            self.max_per_cycle = v;
        }
        if let Some(v) = var("SEND_INTERVAL_SEC").and_then(|v| v.parse().ok()) {
            self.send_interval_secs = v;
        }
        if let Some(v) = var("POLL_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.poll_interval_secs = v;
        }
        if let Some(v) = var("ONE_SHOT") {
            self.one_shot = v == "1";
        }
        if let Some(v) = var("USE_AI_SUMMARY") {
            self.use_ai_summary = v == "1";
        }
        if let Some(v) = var("SENT_NEWS_FILE") {
            self.registry_path = PathBuf::from(v);
        }
        if let Some(v) = var("LEASE_FILE") {
            self.lease.path = PathBuf::from(v);
        }
        if let Some(v) = var("RELAY_INSTANCE_ID") {
            self.lease.owner_id = Some(v);
        }
        if let Some(v) = var("METRICS_ADDR") {
            self.metrics_addr = Some(v);
        }

        if let Some(webhook) = var("FEISHU_WEBHOOK_URL").filter(|w| w != WEBHOOK_PLACEHOLDER) {
            let secret = var("FEISHU_WEBHOOK_SECRET");
            self.add_destination(DestinationConfig::Feishu { webhook, secret });
        } else if let Some(chat_id) = var("FEISHU_CHAT_ID") {
            // App delivery only when no webhook is given and both credentials are present.
            if var("FEISHU_APP_ID").is_some() && var("FEISHU_APP_SECRET").is_some() {
                self.add_destination(DestinationConfig::FeishuApp {
                    chat_id,
                    api_base: var("FEISHU_API_BASE").unwrap_or_else(default_feishu_api_base),
                    app_id_env: default_feishu_app_id_env(),
                    app_secret_env: default_feishu_app_secret_env(),
                });
            }
        }
        if let Some(webhook) = var("DISCORD_WEBHOOK_URL") {
            self.add_destination(DestinationConfig::Discord { webhook });
        }
        if let Some(webhook) = var("SLACK_WEBHOOK_URL") {
            self.add_destination(DestinationConfig::Slack { webhook });
        }
    }

    fn add_destination(&mut self, dest: DestinationConfig) {
        let dup = self
            .destinations
            .iter()
            .any(|d| d.kind() == dest.kind() && d.target() == dest.target());
        if !dup {
            self.destinations.push(dest);
        }
    }

    /// Clamp values into usable ranges and fill in the lease owner id.
    pub fn sanitize(&mut self) {
        self.max_per_cycle = self.max_per_cycle.max(1);
        self.freshness_hours = self.freshness_hours.max(1);
        if !self.send_interval_secs.is_finite() || self.send_interval_secs < 0.0 {
            self.send_interval_secs = 0.0;
        }
        self.poll_interval_secs = self.poll_interval_secs.max(1);
        self.http_timeout_secs = self.http_timeout_secs.max(1);
        self.article_timeout_secs = self.article_timeout_secs.max(1);
        self.lease.stale_after_secs = self.lease.stale_after_secs.max(1);
        self.lease.poll_backoff_secs = self.lease.poll_backoff_secs.max(1);
        self.lease.heartbeat_secs = self
            .lease
            .heartbeat_secs
            .clamp(1, (self.lease.stale_after_secs / 2).max(1));
        self.ai.max_prompt_facts = self.ai.max_prompt_facts.max(1);
        if self.lease.owner_id.as_deref().map_or(true, |s| s.trim().is_empty()) {
            self.lease.owner_id = Some(uuid::Uuid::new_v4().to_string());
        }
    }

    pub fn owner_id(&self) -> String {
        self.lease.owner_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_secs_f64(self.send_interval_secs.max(0.0))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_feeds_destinations_and_sections() {
        let toml = r#"
            freshness_hours = 12
            max_per_cycle = 3

            [[feeds]]
            url = "https://a.test/feed"
            priority = true

            [[feeds]]
            url = "https://b.test/rss"
            name = "B News"

            [[destinations]]
            kind = "feishu"
            webhook = "https://f.test/hook"
            secret = "s"

            [[destinations]]
            kind = "email"
            smtp_host = "smtp.test"
            from = "relay@a.test"
            to = "desk@a.test"

            [[destinations]]
            kind = "log"

            [lease]
            stale_after_secs = 120

            [display]
            utc_offset_hours = 0
            zone_label = "UTC"
        "#;
        let cfg = RelayConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.freshness_hours, 12);
        assert_eq!(cfg.max_per_cycle, 3);
        assert_eq!(cfg.send_interval_secs, 1.0);
        assert_eq!(cfg.feeds.len(), 2);
        assert!(cfg.feeds[0].priority);
        assert_eq!(cfg.feeds[1].name.as_deref(), Some("B News"));
        assert_eq!(cfg.destinations.len(), 3);
        match &cfg.destinations[1] {
            DestinationConfig::Email(e) => assert_eq!(e.user_env, "SMTP_USER"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cfg.destinations[2], DestinationConfig::Log);
        assert_eq!(cfg.lease.stale_after_secs, 120);
        assert_eq!(cfg.lease.poll_backoff_secs, 30);
        assert_eq!(cfg.display.zone_label, "UTC");
        assert_eq!(cfg.ai.providers.len(), 2);
    }

    #[test]
    fn env_overrides_and_sanitize() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MAX_PUSH_PER_CYCLE", "0"),
            ("SEND_INTERVAL_SEC", "-2"),
            ("ONE_SHOT", "1"),
            ("USE_AI_SUMMARY", "0"),
            ("FEISHU_WEBHOOK_URL", "https://f.test/hook"),
            ("DISCORD_WEBHOOK_URL", "https://d.test/hook"),
            ("SENT_NEWS_FILE", "/tmp/sent.txt"),
        ]);
        let mut cfg = RelayConfig::default();
        cfg.destinations.push(DestinationConfig::Feishu {
            webhook: "https://f.test/hook".into(),
            secret: None,
        });
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        cfg.sanitize();

        assert_eq!(cfg.max_per_cycle, 1);
        assert_eq!(cfg.send_interval_secs, 0.0);
        assert!(cfg.one_shot);
        assert!(!cfg.use_ai_summary);
        assert_eq!(cfg.registry_path, PathBuf::from("/tmp/sent.txt"));
        // Feishu already configured with the same webhook: not duplicated.
        assert_eq!(cfg.destinations.len(), 2);
        assert!(cfg.lease.owner_id.is_some());
    }

    #[test]
    fn app_credentials_without_webhook_select_app_delivery() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FEISHU_APP_ID", "cli_a1"),
            ("FEISHU_APP_SECRET", "sec"),
            ("FEISHU_CHAT_ID", "oc_123"),
        ]);
        let mut cfg = RelayConfig::default();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(
            cfg.destinations,
            vec![DestinationConfig::FeishuApp {
                chat_id: "oc_123".into(),
                api_base: "https://open.feishu.cn".into(),
                app_id_env: "FEISHU_APP_ID".into(),
                app_secret_env: "FEISHU_APP_SECRET".into(),
            }]
        );

        // A webhook wins over app credentials.
        let mut cfg = RelayConfig::default();
        cfg.apply_env_overrides(|k| match k {
            "FEISHU_WEBHOOK_URL" => Some("https://f.test/hook".into()),
            other => env.get(other).map(|v| v.to_string()),
        });
        assert_eq!(cfg.destinations.len(), 1);
        assert_eq!(cfg.destinations[0].kind(), "feishu");

        // Missing secret: nothing added.
        let mut cfg = RelayConfig::default();
        cfg.apply_env_overrides(|k| (k != "FEISHU_APP_SECRET").then(|| env.get(k).map(|v| v.to_string())).flatten());
        assert!(cfg.destinations.is_empty());
    }

    #[test]
    fn feishu_app_destination_parses_with_defaults() {
        let cfg = RelayConfig::from_toml_str(
            r#"
            [[destinations]]
            kind = "feishu_app"
            chat_id = "oc_9"
        "#,
        )
        .unwrap();
        match &cfg.destinations[0] {
            DestinationConfig::FeishuApp { chat_id, api_base, app_id_env, .. } => {
                assert_eq!(chat_id, "oc_9");
                assert_eq!(api_base, "https://open.feishu.cn");
                assert_eq!(app_id_env, "FEISHU_APP_ID");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn placeholder_webhook_is_ignored() {
        let mut cfg = RelayConfig::default();
        cfg.apply_env_overrides(|k| (k == "FEISHU_WEBHOOK_URL").then(|| WEBHOOK_PLACEHOLDER.to_string()));
        assert!(cfg.destinations.is_empty());
    }
}
