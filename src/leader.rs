// src/leader.rs
//! Single-active-runner coordination through a shared lease record `owner:unix_ts`.
//!
//! Best effort: a contender writes only when no live lease exists and re-reads to
//! confirm. Two contenders writing between each other's read and write can both
//! see their own record on re-read; the next renewal settles it.
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use metrics::gauge;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderLease {
    pub owner: String,
    pub timestamp: i64,
}

impl LeaderLease {
    pub fn new(owner: impl Into<String>, timestamp: i64) -> Self {
        Self {
            owner: owner.into(),
            timestamp,
        }
    }

    /// `owner:unix_ts`; the owner may itself contain colons.
    pub fn parse(raw: &str) -> Option<Self> {
        let (owner, ts) = raw.trim().rsplit_once(':')?;
        let owner = owner.trim();
        if owner.is_empty() {
            return None;
        }
        Some(Self::new(owner, ts.trim().parse().ok()?))
    }

    pub fn encode(&self) -> String {
        format!("{}:{}", self.owner, self.timestamp)
    }

    pub fn age(&self, now: i64) -> i64 {
        now - self.timestamp
    }

    pub fn is_stale(&self, now: i64, stale_after_secs: i64) -> bool {
        self.age(now) > stale_after_secs
    }
}

/// Storage for the single lease record.
pub trait LeaseStore: Send + Sync {
    /// `None` when absent or unparseable.
    fn read(&self) -> Result<Option<LeaderLease>>;
    fn write(&self, lease: &LeaderLease) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Lease file replaced atomically (tmp + rename), so readers never see partial writes.
#[derive(Debug, Clone)]
pub struct FileLeaseStore {
    path: PathBuf,
}

impl FileLeaseStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LeaseStore for FileLeaseStore {
    fn read(&self) -> Result<Option<LeaderLease>> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(LeaderLease::parse(&s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RelayError::LeaseIo(e)),
        }
    }

    fn write(&self, lease: &LeaderLease) -> Result<()> {
        let write = || -> io::Result<()> {
            if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let tmp = self.path.with_extension(format!("tmp.{}", std::process::id()));
            let mut f = fs::File::create(&tmp)?;
            f.write_all(lease.encode().as_bytes())?;
            f.sync_all()?;
            fs::rename(tmp, &self.path)
        };
        write().map_err(RelayError::LeaseIo)
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RelayError::LeaseIo(e)),
        }
    }
}

/// Shared in-memory record; clones see the same lease.
#[derive(Debug, Clone, Default)]
pub struct MemoryLeaseStore {
    record: Arc<Mutex<Option<LeaderLease>>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<LeaderLease>>> {
        self.record
            .lock()
            .map_err(|_| RelayError::LeaseIo(io::Error::new(io::ErrorKind::Other, "lease mutex poisoned")))
    }
}

impl LeaseStore for MemoryLeaseStore {
    fn read(&self) -> Result<Option<LeaderLease>> {
        Ok(self.lock()?.clone())
    }

    fn write(&self, lease: &LeaderLease) -> Result<()> {
        *self.lock()? = Some(lease.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Contending,
    Leader,
    /// Was leader, then found someone else's live lease on renewal.
    Expired,
    Released,
}

pub struct LeaderElector {
    store: Box<dyn LeaseStore>,
    owner: String,
    stale_after_secs: i64,
    state: LeaseState,
}

impl LeaderElector {
    pub fn new(store: Box<dyn LeaseStore>, owner: impl Into<String>, stale_after: Duration) -> Self {
        Self {
            store,
            owner: owner.into(),
            stale_after_secs: i64::try_from(stale_after.as_secs()).unwrap_or(i64::MAX),
            state: LeaseState::Contending,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn state(&self) -> LeaseState {
        self.state
    }

    pub fn is_leader(&self) -> bool {
        self.state == LeaseState::Leader
    }

    fn set_state(&mut self, state: LeaseState) {
        if self.state != state {
            debug!(target: "leader", owner = %self.owner, from = ?self.state, to = ?state, "lease state");
        }
        self.state = state;
        gauge!("relay_is_leader").set(if state == LeaseState::Leader { 1.0 } else { 0.0 });
    }

    /// A live lease held by someone else, if any.
    fn live_foreign(&self, now: i64) -> Result<Option<LeaderLease>> {
        Ok(self
            .store
            .read()?
            .filter(|l| l.owner != self.owner && !l.is_stale(now, self.stale_after_secs)))
    }

    /// Write `(self, now)` and re-read to confirm.
    fn claim(&mut self, now: i64) -> Result<()> {
        self.store.write(&LeaderLease::new(self.owner.clone(), now))?;
        match self.store.read()? {
            Some(l) if l.owner == self.owner => {
                self.set_state(LeaseState::Leader);
                Ok(())
            }
            other => {
                self.set_state(LeaseState::Contending);
                let (holder, age_secs) = other
                    .map(|l| (l.owner.clone(), l.age(now)))
                    .unwrap_or_else(|| ("<none>".to_string(), 0));
                Err(RelayError::LeaseConflict { holder, age_secs })
            }
        }
    }

    /// Become leader if no live foreign lease exists.
    pub fn try_acquire(&mut self, now: i64) -> Result<()> {
        if let Some(l) = self.live_foreign(now)? {
            self.set_state(LeaseState::Contending);
            return Err(RelayError::LeaseConflict {
                age_secs: l.age(now),
                holder: l.owner,
            });
        }
        self.claim(now)?;
        info!(target: "leader", owner = %self.owner, "acquired lease");
        Ok(())
    }

    /// Refresh our lease. Fails with `LeaseConflict` (state `Expired`) if another
    /// runner took over after our lease went stale.
    pub fn renew(&mut self, now: i64) -> Result<()> {
        if let Some(l) = self.live_foreign(now)? {
            warn!(target: "leader", owner = %self.owner, holder = %l.owner, "lease taken over");
            self.set_state(LeaseState::Expired);
            return Err(RelayError::LeaseConflict {
                age_secs: l.age(now),
                holder: l.owner,
            });
        }
        self.claim(now)
    }

    /// Renew when leading, otherwise contend.
    pub fn ensure(&mut self, now: i64) -> Result<()> {
        match self.state {
            LeaseState::Leader => self.renew(now),
            _ => self.try_acquire(now),
        }
    }

    /// Contend every `backoff` until the lease is ours. I/O errors are logged and retried.
    pub async fn wait_for_leadership(&mut self, backoff: Duration) {
        loop {
            match self.ensure(Utc::now().timestamp()) {
                Ok(()) => return,
                Err(RelayError::LeaseConflict { holder, age_secs }) => {
                    info!(target: "leader", owner = %self.owner, %holder, age_secs, "standing by");
                }
                Err(e) => warn!(target: "leader", owner = %self.owner, error = %e, "lease check failed"),
            }
            tokio::time::sleep(backoff).await;
        }
    }

    /// Drop our lease if we still hold it.
    pub fn release(&mut self) -> Result<()> {
        if self.state == LeaseState::Leader {
            if let Some(l) = self.store.read()? {
                if l.owner == self.owner {
                    self.store.clear()?;
                    info!(target: "leader", owner = %self.owner, "lease released");
                }
            }
        }
        self.set_state(LeaseState::Released);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_encode() {
        let l = LeaderLease::parse("host-a:1:1700000000\n").unwrap();
        assert_eq!(l.owner, "host-a:1");
        assert_eq!(l.timestamp, 1_700_000_000);
        assert_eq!(l.encode(), "host-a:1:1700000000");

        assert!(LeaderLease::parse("").is_none());
        assert!(LeaderLease::parse("no-colon").is_none());
        assert!(LeaderLease::parse(":123").is_none());
        assert!(LeaderLease::parse("a:notanumber").is_none());
    }

    #[test]
    fn staleness_is_strict() {
        let l = LeaderLease::new("a", 1000);
        assert!(!l.is_stale(1300, 300));
        assert!(l.is_stale(1301, 300));
    }

    #[test]
    fn file_store_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLeaseStore::new(dir.path().join("relay.lease"));
        assert_eq!(store.read().unwrap(), None);
        store.write(&LeaderLease::new("a", 5)).unwrap();
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "a:5");
        assert_eq!(store.read().unwrap(), Some(LeaderLease::new("a", 5)));
        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.read().unwrap(), None);
    }

    #[test]
    fn garbage_lease_counts_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.lease");
        std::fs::write(&path, "garbage").unwrap();
        let file = FileLeaseStore::new(&path);
        let mut e = LeaderElector::new(Box::new(file), "me", Duration::from_secs(300));
        e.try_acquire(100).unwrap();
        assert!(e.is_leader());
    }
}
