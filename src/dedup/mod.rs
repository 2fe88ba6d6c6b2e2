// src/dedup/mod.rs
//! In-run fingerprint set plus the cross-run sent registry.
pub mod registry;

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::ingest::types::NewsItem;

pub use registry::SentRegistry;

/// SHA-256 of the canonical URL, or of the title when there is no URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(canonical_url: &str, title: &str) -> Self {
        let url = canonical_url.trim();
        let key = if url.is_empty() { title.trim() } else { url };
        let digest = Sha256::digest(key.as_bytes());
        let mut out = String::with_capacity(64);
        for b in digest.iter() {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for logs.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable set of already-delivered keys (canonical URLs).
pub trait DedupStore: Send {
    fn contains(&self, key: &str) -> bool;
    fn add(&mut self, key: &str);
    fn flush(&mut self) -> Result<()>;

    /// Merge entries written by other runners since the last load.
    fn reload(&mut self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store; `flushes` counts flush calls.
#[derive(Debug, Default, Clone)]
pub struct MemoryDedupStore {
    keys: BTreeSet<String>,
    pub flushes: usize,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            flushes: 0,
        }
    }
}

impl DedupStore for MemoryDedupStore {
    fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn add(&mut self, key: &str) {
        self.keys.insert(key.to_string());
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    New,
    SeenThisCycle,
    AlreadySent,
}

pub struct Deduplicator {
    seen: HashSet<Fingerprint>,
    store: Box<dyn DedupStore>,
}

impl Deduplicator {
    pub fn new(store: Box<dyn DedupStore>) -> Self {
        Self {
            seen: HashSet::new(),
            store,
        }
    }

    /// Reset the in-run set and pick up registry entries written by other runners.
    pub fn begin_cycle(&mut self) -> Result<()> {
        self.seen.clear();
        self.store.reload()
    }

    pub fn admit(&mut self, item: &NewsItem) -> Admission {
        if !self.seen.insert(item.fingerprint()) {
            return Admission::SeenThisCycle;
        }
        if self.already_sent(item) {
            return Admission::AlreadySent;
        }
        Admission::New
    }

    pub fn already_sent(&self, item: &NewsItem) -> bool {
        self.store.contains(&item.registry_key())
    }

    pub fn mark_sent(&mut self, item: &NewsItem) {
        self.store.add(&item.registry_key());
    }

    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    pub fn registry_len(&self) -> usize {
        self.store.len()
    }
}
