// src/analyze/summarize.rs
//! Summarization with numeric-fact grounding.
//!
//! Providers are tried in order; the first non-empty answer wins. A summary whose
//! numbers are not all found in the source gets exactly one regeneration carrying
//! the allowed fact list. With no usable provider the feed excerpt is truncated.
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analyze::facts::{FactSet, MAX_PROMPT_FACTS};
use crate::error::{RelayError, Result};

/// Character budget of the truncation fallback.
pub const FALLBACK_CHARS: usize = 320;
/// Output budget for CJK-dense text, in characters.
pub const CJK_CHAR_BUDGET: usize = 400;
/// Output budget for space-delimited text, in words.
pub const WORD_BUDGET: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRequest {
    pub title: String,
    pub content: String,
    /// Set on regeneration: the only numeric facts the answer may use.
    pub allowed_facts: Option<Vec<String>>,
}

impl SummaryRequest {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            allowed_facts: None,
        }
    }

    pub fn with_allowed_facts(mut self, facts: Vec<String>) -> Self {
        self.allowed_facts = Some(facts);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub title: String,
    pub summary: String,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;
    async fn summarize(&self, req: &SummaryRequest) -> Result<Draft>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Provider(String),
    Fallback,
}

/// Ordered providers behind one interface.
#[derive(Clone, Default)]
pub struct FirstSuccess {
    providers: Vec<Arc<dyn Summarizer>>,
}

impl FirstSuccess {
    pub fn new(providers: Vec<Arc<dyn Summarizer>>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// First provider answering with a non-empty summary, or `None` if all fail.
    pub async fn first(&self, req: &SummaryRequest) -> Option<(String, Draft)> {
        for p in &self.providers {
            match p.summarize(req).await {
                Ok(d) if !d.summary.trim().is_empty() => return Some((p.name().to_string(), d)),
                Ok(_) => {
                    let e = RelayError::summarization(p.name(), "empty answer");
                    warn!(target: "summarize", error = %e, "provider failed; trying next");
                }
                Err(e) => warn!(target: "summarize", provider = p.name(), error = %e, "provider failed; trying next"),
            }
        }
        None
    }

    /// Like `first`, falling back to truncation of `excerpt`.
    pub async fn run(&self, req: &SummaryRequest, excerpt: &str) -> (Draft, Provenance) {
        match self.first(req).await {
            Some((name, d)) => (d, Provenance::Provider(name)),
            None => {
                if !self.providers.is_empty() {
                    counter!("relay_summary_fallbacks_total").increment(1);
                }
                (
                    Draft {
                        title: req.title.clone(),
                        summary: fallback_summary(&req.title, excerpt),
                    },
                    Provenance::Fallback,
                )
            }
        }
    }
}

/// Excerpt (or title when empty) cut to `FALLBACK_CHARS`, with an ellipsis only when cut.
pub fn fallback_summary(title: &str, excerpt: &str) -> String {
    let text = match excerpt.trim() {
        "" => title.trim(),
        t => t,
    };
    if text.chars().count() > FALLBACK_CHARS {
        let mut cut: String = text.chars().take(FALLBACK_CHARS).collect();
        cut.push('…');
        cut
    } else {
        text.to_string()
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF      // kana
        | 0x3400..=0x4DBF    // CJK ext A
        | 0x4E00..=0x9FFF    // CJK unified
        | 0xAC00..=0xD7AF    // hangul
        | 0xF900..=0xFAFF
        | 0x20000..=0x2FA1F)
}

/// More than 30% of non-whitespace characters are CJK.
pub fn is_cjk_dense(text: &str) -> bool {
    let (mut total, mut cjk) = (0usize, 0usize);
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if is_cjk(c) {
            cjk += 1;
        }
    }
    total > 0 && cjk * 10 > total * 3
}

/// Clamp output length: characters for CJK-dense text, words otherwise.
pub fn clamp_summary(text: &str) -> String {
    let text = text.trim();
    if is_cjk_dense(text) {
        if text.chars().count() > CJK_CHAR_BUDGET {
            let mut cut: String = text.chars().take(CJK_CHAR_BUDGET).collect();
            cut.push('…');
            return cut;
        }
    } else {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() > WORD_BUDGET {
            let mut cut = words[..WORD_BUDGET].join(" ");
            cut.push('…');
            return cut;
        }
    }
    text.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSummary {
    pub title: String,
    pub summary: String,
    pub provenance: Provenance,
    pub regenerated: bool,
    /// Facts still ungrounded in the accepted output (normalized keys).
    pub ungrounded: Vec<String>,
}

pub struct Verifier {
    chain: FirstSuccess,
    max_prompt_facts: usize,
}

impl Verifier {
    pub fn new(chain: FirstSuccess) -> Self {
        Self {
            chain,
            max_prompt_facts: MAX_PROMPT_FACTS,
        }
    }

    pub fn with_max_prompt_facts(mut self, n: usize) -> Self {
        self.max_prompt_facts = n.max(1);
        self
    }

    pub fn chain(&self) -> &FirstSuccess {
        &self.chain
    }

    /// Summarize `content`, checking the answer's facts against `title` + `content`.
    /// `excerpt` feeds the truncation fallback.
    pub async fn summarize(&self, title: &str, content: &str, excerpt: &str) -> VerifiedSummary {
        let req = SummaryRequest::new(title, content);
        let (draft, provenance) = self.chain.run(&req, excerpt).await;

        if provenance == Provenance::Fallback {
            return VerifiedSummary {
                title: draft.title,
                summary: clamp_summary(&draft.summary),
                provenance,
                regenerated: false,
                ungrounded: Vec::new(),
            };
        }

        let source = FactSet::extract(&format!("{title}\n{content}"));
        let missing = ungrounded_keys(&source, &draft.summary);
        if missing.is_empty() {
            debug!(target: "summarize", facts = source.len(), "summary grounded");
            return VerifiedSummary {
                title: draft.title,
                summary: clamp_summary(&draft.summary),
                provenance,
                regenerated: false,
                ungrounded: Vec::new(),
            };
        }

        let mismatch = RelayError::FactMismatch { ungrounded: missing.clone() };
        info!(target: "summarize", error = %mismatch, "regenerating with fact list");
        counter!("relay_fact_regenerations_total").increment(1);

        let retry = req.with_allowed_facts(source.prompt_list(self.max_prompt_facts));
        match self.chain.first(&retry).await {
            Some((name, redo)) => {
                let still = ungrounded_keys(&source, &redo.summary);
                if !still.is_empty() {
                    warn!(target: "summarize", remaining = ?still, "regenerated summary still ungrounded; accepting");
                }
                VerifiedSummary {
                    title: redo.title,
                    summary: clamp_summary(&redo.summary),
                    provenance: Provenance::Provider(name),
                    regenerated: true,
                    ungrounded: still,
                }
            }
            None => {
                warn!(target: "summarize", "regeneration failed; keeping first draft");
                VerifiedSummary {
                    title: draft.title,
                    summary: clamp_summary(&draft.summary),
                    provenance,
                    regenerated: true,
                    ungrounded: missing,
                }
            }
        }
    }
}

fn ungrounded_keys(source: &FactSet, summary: &str) -> Vec<String> {
    let produced = FactSet::extract(summary);
    source.ungrounded(&produced).iter().map(|f| f.key()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_truncates_with_ellipsis_only_when_cut() {
        assert_eq!(fallback_summary("T", "short body"), "short body");
        assert_eq!(fallback_summary("Title only", "   "), "Title only");

        let long = "x".repeat(FALLBACK_CHARS + 1);
        let out = fallback_summary("T", &long);
        assert_eq!(out.chars().count(), FALLBACK_CHARS + 1);
        assert!(out.ends_with('…'));

        let exact = "y".repeat(FALLBACK_CHARS);
        assert_eq!(fallback_summary("T", &exact), exact);
    }

    #[test]
    fn cjk_density() {
        assert!(is_cjk_dense("马来西亚央行维持利率不变"));
        assert!(is_cjk_dense("Bank Negara 维持利率不变 3%"));
        assert!(!is_cjk_dense("Bank Negara keeps the OPR at 3%"));
        assert!(!is_cjk_dense("   "));
    }

    #[test]
    fn clamp_by_chars_or_words() {
        let cjk = "字".repeat(CJK_CHAR_BUDGET + 10);
        let out = clamp_summary(&cjk);
        assert_eq!(out.chars().count(), CJK_CHAR_BUDGET + 1);

        let words = vec!["word"; WORD_BUDGET + 5].join(" ");
        let out = clamp_summary(&words);
        assert_eq!(out.split_whitespace().count(), WORD_BUDGET);
        assert!(out.ends_with('…'));

        assert_eq!(clamp_summary("  fits fine "), "fits fine");
    }
}
