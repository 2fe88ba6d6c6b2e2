// src/analyze/ai_adapter.rs
//! OpenAI-compatible chat-completion summarizers (DeepSeek, OpenAI) and a scripted stub.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::analyze::summarize::{Draft, SummaryRequest, Summarizer};
use crate::config::AiProviderConfig;
use crate::error::{RelayError, Result};

const SYSTEM_PROMPT: &str = "You are a news editor. Summarize the article in Simplified Chinese \
for a chat channel. Keep key facts, names, dates and numbers exactly as written in the article. \
Keep the summary under 300 Chinese characters. Reply with JSON only: \
{\"title\": \"<translated headline>\", \"summary\": \"<summary>\"}.";

/// Chat completion provider. The API key is read from the configured env var at build time.
pub struct ChatCompletionProvider {
    name: String,
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionProvider {
    pub fn from_config(cfg: &AiProviderConfig, timeout: Duration) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env).unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(RelayError::Config(format!(
                "provider {}: {} is not set",
                cfg.name, cfg.api_key_env
            )));
        }
        Self::with_key(cfg, api_key, timeout)
    }

    pub fn with_key(cfg: &AiProviderConfig, api_key: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-relay/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            name: cfg.name.clone(),
            http,
            endpoint: cfg.endpoint.clone(),
            api_key,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        })
    }
}

#[async_trait]
impl Summarizer for ChatCompletionProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn summarize(&self, req: &SummaryRequest) -> Result<Draft> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
            stream: bool,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let user = build_prompt(req);
        let body = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::summarization(&self.name, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::summarization(&self.name, format!("HTTP {status}")));
        }
        let parsed: Resp = resp
            .json()
            .await
            .map_err(|e| RelayError::summarization(&self.name, e))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        parse_answer(&content, &req.title)
            .ok_or_else(|| RelayError::summarization(&self.name, "empty answer"))
    }
}

/// User message: title, content and, on regeneration, the allowed facts.
pub fn build_prompt(req: &SummaryRequest) -> String {
    let mut out = format!("Article Title: {}\n\nArticle Content:\n{}", req.title, req.content);
    if let Some(facts) = req.allowed_facts.as_deref() {
        out.push_str(
            "\n\nYour previous summary contained numbers that are not in the article. \
             Use only the following numbers, prices and specifications; do not write any other number:\n",
        );
        if facts.is_empty() {
            out.push_str("(none: write the summary without numbers)\n");
        }
        for f in facts {
            out.push_str("- ");
            out.push_str(f);
            out.push('\n');
        }
    }
    out
}

/// JSON `{title, summary}` answer, tolerating code fences; plain text becomes the summary.
pub fn parse_answer(raw: &str, fallback_title: &str) -> Option<Draft> {
    #[derive(Deserialize)]
    struct Answer {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        summary: Option<String>,
    }

    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    let (title, summary) = match serde_json::from_str::<Answer>(unfenced) {
        Ok(a) => (a.title, a.summary.unwrap_or_default()),
        Err(_) => (None, unfenced.to_string()),
    };
    let summary = summary.trim().to_string();
    if summary.is_empty() {
        return None;
    }
    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_title.to_string());
    Some(Draft { title, summary })
}

/// Replays queued answers in order and records every request. An exhausted queue fails.
#[derive(Clone)]
pub struct ScriptedSummarizer {
    name: String,
    answers: Arc<Mutex<VecDeque<Result<Draft>>>>,
    requests: Arc<Mutex<Vec<SummaryRequest>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSummarizer {
    pub fn new(name: impl Into<String>, answers: Vec<Result<Draft>>) -> Self {
        Self {
            name: name.into(),
            answers: Arc::new(Mutex::new(answers.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always answers with the same summary, keeping the request title.
    pub fn echo(name: impl Into<String>, summary: impl Into<String>, times: usize) -> Self {
        let summary = summary.into();
        let answers = (0..times)
            .map(|_| {
                Ok(Draft {
                    title: String::new(),
                    summary: summary.clone(),
                })
            })
            .collect();
        Self::new(name, answers)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SummaryRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn summarize(&self, req: &SummaryRequest) -> Result<Draft> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut r) = self.requests.lock() {
            r.push(req.clone());
        }
        let next = self.answers.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(mut d)) => {
                if d.title.is_empty() {
                    d.title = req.title.clone();
                }
                Ok(d)
            }
            Some(Err(e)) => Err(e),
            None => Err(RelayError::summarization(&self.name, "script exhausted")),
        }
    }
}
