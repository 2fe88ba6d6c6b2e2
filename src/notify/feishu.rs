// src/notify/feishu.rs
//! Feishu/Lark delivery: custom-bot webhook (optional signature) or app bot posting
//! to a chat with a tenant access token. Both send the same interactive card.
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use ring::hmac;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use super::{Notifier, OutboundMessage};
use crate::error::{RelayError, Result};

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

const DISCLAIMER: &str = "注：摘要、正文均不代表个人观点";

/// Refresh the tenant token this long before Feishu says it expires.
const TOKEN_REFRESH_MARGIN_SECS: u64 = 300;

pub struct FeishuNotifier {
    webhook: String,
    secret: Option<String>,
    client: Client,
}

impl FeishuNotifier {
    pub fn new(webhook: String, secret: Option<String>, timeout: Duration) -> Result<Self> {
        if webhook.trim().is_empty() {
            return Err(RelayError::Config("feishu webhook is empty".into()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            webhook,
            secret: secret.filter(|s| !s.trim().is_empty()),
            client,
        })
    }

    fn payload(&self, msg: &OutboundMessage, timestamp: i64) -> Value {
        let mut payload = json!({
            "msg_type": "interactive",
            "card": build_card(msg),
        });
        if let Some(secret) = &self.secret {
            payload["timestamp"] = json!(timestamp.to_string());
            payload["sign"] = json!(sign(secret, timestamp));
        }
        payload
    }
}

/// Base64 HMAC-SHA256 keyed by `"{timestamp}\n{secret}"` over an empty message.
pub fn sign(secret: &str, timestamp: i64) -> String {
    let string_to_sign = format!("{timestamp}\n{secret}");
    let key = hmac::Key::new(hmac::HMAC_SHA256, string_to_sign.as_bytes());
    let tag = hmac::sign(&key, b"");
    BASE64.encode(tag.as_ref())
}

pub fn build_card(msg: &OutboundMessage) -> Value {
    json!({
        "config": { "wide_screen_mode": true },
        "header": {
            "template": "blue",
            "title": { "tag": "plain_text", "content": msg.title },
        },
        "elements": [
            { "tag": "div", "text": { "tag": "lark_md", "content": msg.body } },
            { "tag": "hr" },
            { "tag": "note", "elements": [ { "tag": "plain_text", "content": DISCLAIMER } ] },
        ],
    })
}

/// Feishu answers 200 even for rejected messages; the body carries the verdict.
fn check_response(body: &Value) -> std::result::Result<(), String> {
    for field in ["code", "StatusCode"] {
        if let Some(code) = body.get(field).and_then(Value::as_i64) {
            if code != 0 {
                let msg = body
                    .get("msg")
                    .or_else(|| body.get("StatusMessage"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(format!("{field}={code}: {msg}"));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Notifier for FeishuNotifier {
    fn destination(&self) -> &str {
        "feishu"
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let payload = self.payload(msg, chrono::Utc::now().timestamp());
        let resp = self
            .client
            .post(&self.webhook)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RelayError::dispatch("feishu", e))?
            .error_for_status()
            .map_err(|e| RelayError::dispatch("feishu", e))?;
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        check_response(&body).map_err(|e| RelayError::dispatch("feishu", e))
    }
}

struct TenantToken {
    value: String,
    refresh_at: Instant,
}

/// App-bot delivery: `tenant_access_token/internal`, then `im/v1/messages` to a chat.
pub struct FeishuAppNotifier {
    api_base: String,
    app_id: String,
    app_secret: String,
    chat_id: String,
    client: Client,
    token: Mutex<Option<TenantToken>>,
}

impl FeishuAppNotifier {
    pub fn new(
        api_base: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let (app_id, app_secret, chat_id) = (app_id.into(), app_secret.into(), chat_id.into());
        for (what, v) in [("app id", &app_id), ("app secret", &app_secret), ("chat id", &chat_id)] {
            if v.trim().is_empty() {
                return Err(RelayError::Config(format!("feishu {what} is empty")));
            }
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            app_id,
            app_secret,
            chat_id,
            client,
            token: Mutex::new(None),
        })
    }

    /// Credentials come from the env vars named in the config.
    pub fn from_env(
        api_base: &str,
        app_id_env: &str,
        app_secret_env: &str,
        chat_id: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let app_id = std::env::var(app_id_env).map_err(|_| RelayError::Config(format!("{app_id_env} missing")))?;
        let app_secret =
            std::env::var(app_secret_env).map_err(|_| RelayError::Config(format!("{app_secret_env} missing")))?;
        Self::new(api_base, app_id, app_secret, chat_id, timeout)
    }

    async fn tenant_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(t) = cached.as_ref().filter(|t| t.refresh_at > Instant::now()) {
            return Ok(t.value.clone());
        }

        let url = format!("{}/open-apis/auth/v3/tenant_access_token/internal", self.api_base);
        let body: Value = self
            .client
            .post(url)
            .json(&json!({ "app_id": self.app_id, "app_secret": self.app_secret }))
            .send()
            .await
            .map_err(|e| RelayError::dispatch("feishu_app", e))?
            .error_for_status()
            .map_err(|e| RelayError::dispatch("feishu_app", e))?
            .json()
            .await
            .map_err(|e| RelayError::dispatch("feishu_app", e))?;
        check_response(&body).map_err(|e| RelayError::dispatch("feishu_app", format!("token: {e}")))?;

        let value = body
            .get("tenant_access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RelayError::dispatch("feishu_app", "token missing from response"))?
            .to_string();
        let ttl = body.get("expire").and_then(Value::as_u64).unwrap_or(7200);
        *cached = Some(TenantToken {
            value: value.clone(),
            refresh_at: Instant::now() + Duration::from_secs(ttl.saturating_sub(TOKEN_REFRESH_MARGIN_SECS)),
        });
        debug!(target: "dispatch", ttl, "feishu tenant token refreshed");
        Ok(value)
    }

    fn payload(&self, msg: &OutboundMessage) -> Value {
        json!({
            "receive_id": self.chat_id,
            "msg_type": "interactive",
            // The message API wants the card as a JSON string.
            "content": build_card(msg).to_string(),
        })
    }
}

#[async_trait]
impl Notifier for FeishuAppNotifier {
    fn destination(&self) -> &str {
        "feishu_app"
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let token = self.tenant_token().await?;
        let url = format!("{}/open-apis/im/v1/messages", self.api_base);
        let resp = self
            .client
            .post(url)
            .query(&[("receive_id_type", "chat_id")])
            .bearer_auth(token)
            .json(&self.payload(msg))
            .send()
            .await
            .map_err(|e| RelayError::dispatch("feishu_app", e))?;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        let verdict = if status.is_success() {
            check_response(&body)
        } else {
            check_response(&body).and(Err(format!("HTTP {status}")))
        };
        if verdict.is_err() {
            // A rejected token is the usual cause; fetch a fresh one next time.
            *self.token.lock().await = None;
        }
        verdict.map_err(|e| RelayError::dispatch("feishu_app", e))
    }
}
