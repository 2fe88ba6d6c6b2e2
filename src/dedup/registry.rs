// src/dedup/registry.rs
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::dedup::DedupStore;
use crate::error::{RelayError, Result};

/// Line-oriented file of sent URLs. Loaded in full, rewritten in full (sorted).
#[derive(Debug)]
pub struct SentRegistry {
    path: PathBuf,
    keys: BTreeSet<String>,
}

impl SentRegistry {
    /// Open the registry at `path`. A missing file is an empty registry.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let keys = read_keys(&path).map_err(RelayError::RegistryIo)?;
        debug!(target: "dedup", path = %path.display(), entries = keys.len(), "registry loaded");
        Ok(Self { path, keys })
    }

    /// Like `open`, but an unreadable file degrades to an empty in-memory registry.
    pub fn open_or_empty(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(path.clone()) {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "dedup", path = %path.display(), error = %e, "registry unreadable; starting empty");
                Self {
                    path,
                    keys: BTreeSet::new(),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_keys(path: &Path) -> io::Result<BTreeSet<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(s
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(e) => Err(e),
    }
}

fn write_keys(path: &Path, keys: &BTreeSet<String>) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    let mut f = fs::File::create(&tmp)?;
    for k in keys {
        writeln!(f, "{k}")?;
    }
    f.sync_all()?;
    fs::rename(tmp, path)?;
    Ok(())
}

impl DedupStore for SentRegistry {
    fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn add(&mut self, key: &str) {
        let key = key.trim();
        if !key.is_empty() {
            self.keys.insert(key.to_string());
        }
    }

    fn flush(&mut self) -> Result<()> {
        write_keys(&self.path, &self.keys).map_err(RelayError::RegistryIo)
    }

    fn reload(&mut self) -> Result<()> {
        let on_disk = read_keys(&self.path).map_err(RelayError::RegistryIo)?;
        self.keys.extend(on_disk);
        Ok(())
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_writes_sorted_lines_and_reload_merges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sent.txt");

        let mut reg = SentRegistry::open(&path).unwrap();
        assert!(reg.is_empty());
        reg.add("https://b.test/2");
        reg.add("https://a.test/1");
        reg.add("  ");
        reg.flush().unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "https://a.test/1\nhttps://b.test/2\n"
        );

        // Another runner appends an entry.
        fs::write(&path, "https://a.test/1\nhttps://c.test/3\n").unwrap();
        reg.reload().unwrap();
        assert_eq!(reg.len(), 3);
        assert!(reg.contains("https://b.test/2"));
        assert!(reg.contains("https://c.test/3"));
    }
}
