// src/notify/discord.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Notifier, OutboundMessage};
use crate::error::{RelayError, Result};

/// Discord embed descriptions are capped at 4096 characters.
const MAX_DESCRIPTION: usize = 4096;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(webhook: String, timeout: Duration) -> Result<Self> {
        if webhook.trim().is_empty() {
            return Err(RelayError::Config("discord webhook is empty".into()));
        }
        Ok(Self {
            webhook,
            client: Client::new(),
            timeout,
            max_retries: 1,
        })
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    fn backoff(attempt: u8) -> Duration {
        Duration::from_millis(500u64 << (attempt - 1))
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn destination(&self) -> &str {
        "discord"
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let payload = DiscordWebhookPayload::embed(msg);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => format!("HTTP error: {e}"),
                },
                Err(e) => format!("request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(RelayError::dispatch("discord", err));
            }
            tokio::time::sleep(Self::backoff(attempt)).await;
        }
    }
}

#[derive(Serialize)]
struct DiscordImage {
    url: String,
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<DiscordImage>,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn embed(msg: &OutboundMessage) -> Self {
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: msg.title.clone(),
                description: msg.body.chars().take(MAX_DESCRIPTION).collect(),
                url: Some(msg.link.clone()).filter(|l| !l.is_empty()),
                image: msg.cover_url.clone().map(|url| DiscordImage { url }),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_carries_link_and_cover() {
        let msg = OutboundMessage {
            title: "t".into(),
            body: "b".into(),
            link: "https://n.test/a".into(),
            cover_url: Some("https://img.test/c.jpg".into()),
        };
        let v = serde_json::to_value(DiscordWebhookPayload::embed(&msg)).unwrap();
        assert_eq!(v["embeds"][0]["url"], "https://n.test/a");
        assert_eq!(v["embeds"][0]["image"]["url"], "https://img.test/c.jpg");
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(DiscordNotifier::backoff(1), Duration::from_millis(500));
        assert_eq!(DiscordNotifier::backoff(3), Duration::from_millis(2000));
    }
}
