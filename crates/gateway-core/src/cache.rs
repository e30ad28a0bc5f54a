//! Process-wide cache of per-user host grants.
//!
//! Reads vastly outnumber writes, so a plain `RwLock` is enough. When a cache
//! file is configured the map is persisted after every write, letting the
//! short-lived forced-command processes share it.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GatewayResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub allowed_hosts: BTreeSet<String>,
    pub hostgroups: BTreeSet<String>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(allowed_hosts: BTreeSet<String>, hostgroups: BTreeSet<String>) -> Self {
        Self {
            allowed_hosts,
            hostgroups,
            fetched_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct HostCache {
    ttl: Duration,
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, CacheEntry>>,
}

impl HostCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            path: None,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Cache backed by `path`. An unreadable or corrupt file starts empty.
    pub fn persistent(ttl: Duration, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable host cache");
                BTreeMap::new()
            }
        };
        Self {
            ttl,
            path: Some(path),
            entries: RwLock::new(entries),
        }
    }

    /// Entry for `user` if it is younger than the TTL.
    pub fn get(&self, user: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(user)?;
        let age = Utc::now().signed_duration_since(entry.fetched_at).to_std().unwrap_or_default();
        if age > self.ttl {
            debug!(user, age_secs = age.as_secs(), "host cache entry expired");
            return None;
        }
        Some(entry.clone())
    }

    pub fn put(&self, user: &str, entry: CacheEntry) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(user.to_string(), entry);
        self.persist(&entries);
    }

    /// Drop the entry for `user`. Missing entries are fine.
    pub fn invalidate(&self, user: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(user).is_some() {
            debug!(user, "host cache entry invalidated");
            self.persist(&entries);
        }
    }

    fn persist(&self, entries: &BTreeMap<String, CacheEntry>) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(err) = write_entries(path, entries) {
            warn!(path = %path.display(), error = %err, "failed to persist host cache");
        }
    }
}

fn read_entries(path: &Path) -> GatewayResult<BTreeMap<String, CacheEntry>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(&raw)?)
}

fn write_entries(path: &Path, entries: &BTreeMap<String, CacheEntry>) -> GatewayResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let staging = staging_path(path, std::process::id());
    fs::write(&staging, serde_json::to_vec_pretty(entries)?)?;
    fs::rename(&staging, path)?;
    Ok(())
}

/// Sibling of `path` private to one process; concurrent gateways each stage
/// their own copy and the last rename wins whole.
fn staging_path(path: &Path, pid: u32) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(format!(".{pid}.tmp"));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_file_is_per_process() {
        let target = Path::new("/var/lib/sshgate/hosts-cache.json");
        let first = staging_path(target, 100);
        let second = staging_path(target, 200);
        assert_ne!(first, second);
        assert_eq!(first, Path::new("/var/lib/sshgate/hosts-cache.json.100.tmp"));
        assert_eq!(second.parent(), target.parent());
    }

    #[test]
    fn persisting_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = HostCache::persistent(Duration::from_secs(60), &path);
        cache.put("alice", CacheEntry::new(["db1".to_string()].into(), BTreeSet::new()));

        let names: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|entry| entry.unwrap().file_name()).collect();
        assert_eq!(names, vec![std::ffi::OsString::from("cache.json")]);
        assert!(staging_path(&path, std::process::id()).metadata().is_err());
    }
}
