// src/analyze/facts.rs
//! Numeric facts in text: prices, unit-bearing specs and bare numbers.
//!
//! A summary is grounded when every fact it contains also occurs in the source.
use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Upper bound on facts handed to a regeneration prompt.
pub const MAX_PROMPT_FACTS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FactKind {
    Price,
    Spec,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fact {
    pub kind: FactKind,
    /// Surface form as it appeared (trimmed).
    pub text: String,
}

impl Fact {
    /// Comparison key: whitespace removed, lowercased, thousands separators dropped.
    pub fn key(&self) -> String {
        normalize_token(&self.text)
    }
}

pub fn normalize_token(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let mut out = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ',' {
            let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
            let next_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            if prev_digit && next_digit {
                continue;
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

// Word boundaries are ASCII-only: CJK letters count as \w in Unicode mode,
// so `售价RM1,999` would otherwise have no boundary before `RM`.
static RE_PRICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        (?:
            (?:(?-u:\b)(?:rm|usd|us\$|s\$|sgd|myr|rmb|cny|hk\$|eur|gbp|jpy|idr|thb)|\$|€|£|¥|₹)
            \s?\d[\d,]*(?:\.\d+)?
            (?:\s?(?:k|m|mil|million|bil|billion|bn|trillion|juta|bilion)(?-u:\b))?
        |
            \d[\d,]*(?:\.\d+)?\s?(?:ringgit|dollars?|yuan|euros?|元|令吉|美元|万|亿)
        )",
    )
    .expect("price regex")
});

static RE_SPEC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        (?-u:\b)\d{3,5}\s?[x×]\s?\d{3,5}(?-u:\b)
        |
        \d+(?:\.\d+)?\s?%
        |
        (?-u:\b)\d+(?:\.\d+)?\s?(?:tb|gb|mb|kb|mah|kwh|wh|ghz|mhz|hz|mp|nm|mm|cm|km|kg|fps|inch(?:es)?|w|v|g|k|p)(?-u:\b)
        ",
    )
    .expect("spec regex")
});

static RE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)*").expect("number regex"));

/// Facts of one text, keyed by normalized value. First kind seen wins (price, spec, number).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactSet {
    by_key: BTreeMap<String, Fact>,
}

impl FactSet {
    pub fn extract(text: &str) -> Self {
        let mut set = FactSet::default();
        for (kind, re) in [
            (FactKind::Price, &*RE_PRICE),
            (FactKind::Spec, &*RE_SPEC),
            (FactKind::Number, &*RE_NUMBER),
        ] {
            for m in re.find_iter(text) {
                set.insert(Fact {
                    kind,
                    text: m.as_str().trim().to_string(),
                });
            }
        }
        set
    }

    fn insert(&mut self, fact: Fact) {
        let key = fact.key();
        if !key.is_empty() {
            self.by_key.entry(key).or_insert(fact);
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.by_key.values()
    }

    pub fn of_kind(&self, kind: FactKind) -> impl Iterator<Item = &Fact> {
        self.iter().filter(move |f| f.kind == kind)
    }

    /// Facts of `produced` with no counterpart here.
    pub fn ungrounded<'a>(&self, produced: &'a FactSet) -> Vec<&'a Fact> {
        produced
            .by_key
            .iter()
            .filter(|(k, _)| !self.by_key.contains_key(*k))
            .map(|(_, f)| f)
            .collect()
    }

    pub fn grounds(&self, produced: &FactSet) -> bool {
        produced.by_key.keys().all(|k| self.by_key.contains_key(k))
    }

    /// Surface forms for a prompt: prices, then specs, then numbers; at most `limit`.
    pub fn prompt_list(&self, limit: usize) -> Vec<String> {
        [FactKind::Price, FactKind::Spec, FactKind::Number]
            .into_iter()
            .flat_map(|k| self.of_kind(k))
            .map(|f| f.text.clone())
            .take(limit)
            .collect()
    }
}
