// src/notify/slack.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{Notifier, OutboundMessage};
use crate::error::{RelayError, Result};

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: String, timeout: Duration) -> Result<Self> {
        if webhook_url.trim().is_empty() {
            return Err(RelayError::Config("slack webhook is empty".into()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { webhook_url, client })
    }
}

/// Slack mrkdwn uses `<url|label>` links instead of `[label](url)`.
pub fn to_mrkdwn(msg: &OutboundMessage) -> String {
    let re = regex_link();
    let body = re.replace_all(&msg.body, "<$2|$1>");
    format!("*{}*\n{}", msg.title, body)
}

fn regex_link() -> &'static regex::Regex {
    static RE: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    RE.get_or_init(|| regex::Regex::new(r"\[([^\]]+)\]\((https?://[^)\s]+)\)").expect("link regex"))
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn destination(&self) -> &str {
        "slack"
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let body = serde_json::json!({ "text": to_mrkdwn(msg) });
        self.client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::dispatch("slack", e))?
            .error_for_status()
            .map_err(|e| RelayError::dispatch("slack", e))?;
        Ok(())
    }
}
