// src/analyze/classify.rs
//! Keyword classifier: ordered `(Category, Matcher)` rules, first match wins.
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static BUILTIN_RULES: &str = include_str!("../../config/categories.toml");

static BUILTIN: Lazy<Classifier> = Lazy::new(|| {
    Classifier::from_toml_str(BUILTIN_RULES).unwrap_or_else(|e| {
        tracing::error!(target: "classify", error = %e, "built-in category rules invalid");
        Classifier { rules: Vec::new() }
    })
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Economy,
    Disaster,
    Sports,
    Technology,
    Entertainment,
    General,
}

impl Category {
    /// Label shown in message titles.
    pub fn label(self) -> &'static str {
        match self {
            Category::Economy => "经济",
            Category::Disaster => "灾害",
            Category::Sports => "体育",
            Category::Technology => "科技",
            Category::Entertainment => "文娱",
            Category::General => "综合",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    WordBoundary,
    Substring,
}

impl MatchPolicy {
    /// Pure ASCII-letter keywords of 3+ letters match whole words; everything else is a substring.
    pub fn for_keyword(keyword: &str) -> Self {
        if keyword.len() >= 3 && keyword.chars().all(|c| c.is_ascii_alphabetic()) {
            MatchPolicy::WordBoundary
        } else {
            MatchPolicy::Substring
        }
    }
}

#[derive(Debug, Clone)]
pub struct Matcher {
    words: Option<Regex>,
    substrings: Vec<String>,
}

impl Matcher {
    pub fn new<I, S>(keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut words: Vec<String> = Vec::new();
        let mut substrings: Vec<String> = Vec::new();
        for kw in keywords {
            let kw = kw.as_ref().trim().to_lowercase();
            if kw.is_empty() {
                continue;
            }
            let bucket = match MatchPolicy::for_keyword(&kw) {
                MatchPolicy::WordBoundary => &mut words,
                MatchPolicy::Substring => &mut substrings,
            };
            if !bucket.contains(&kw) {
                bucket.push(kw);
            }
        }

        let words = if words.is_empty() {
            None
        } else {
            let alternation = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
            Some(Regex::new(&format!(r"\b(?:{alternation})\b")).context("compiling keyword regex")?)
        };
        Ok(Self { words, substrings })
    }

    /// `text` must already be lowercased.
    pub fn is_match(&self, text: &str) -> bool {
        self.words.as_ref().is_some_and(|re| re.is_match(text))
            || self.substrings.iter().any(|s| text.contains(s.as_str()))
    }
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    category: Category,
    keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<(Category, Matcher)>,
}

impl Classifier {
    pub fn new(rules: Vec<(Category, Matcher)>) -> Self {
        Self { rules }
    }

    /// Rules shipped in `config/categories.toml`.
    pub fn builtin() -> &'static Classifier {
        &BUILTIN
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: RulesFile = toml::from_str(s).context("parsing category rules")?;
        let rules = file
            .rules
            .into_iter()
            .map(|r| Ok((r.category, Matcher::new(&r.keywords)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading category rules {}", path.display()))?;
        Self::from_toml_str(&s)
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.rules.iter().map(|(c, _)| *c)
    }

    pub fn classify(&self, title: &str, text: &str) -> Category {
        let haystack = format!("{title} {text}").to_lowercase();
        self.rules
            .iter()
            .find(|(_, m)| m.is_match(&haystack))
            .map(|(c, _)| *c)
            .unwrap_or(Category::General)
    }
}
