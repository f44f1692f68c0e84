//! Key-value storage backing the runtime
//!
//! The kernel only needs `get/set/remove` with TTLs plus a lease-style lock.
//! Two drivers ship with the crate: an in-memory map and a directory of
//! JSON envelopes (one file per key).

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ghost_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value`; `None` ttl never expires.
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    fn remove(&self, keys: &[&str]) -> Result<()>;

    /// Try to acquire an exclusive lease. Returns `false` if somebody else holds it.
    fn lock(&self, key: &str, ttl: Duration) -> Result<bool>;

    fn unlock(&self, key: &str) -> Result<()>;
}

pub fn process_key(sid: &str, pid: &str) -> String {
    format!("runtime:process:{}:{}", sid, pid)
}

pub fn task_key(tid: &str) -> String {
    format!("runtime:task:{}", tid)
}

pub fn process_lock_key(sid: &str, pid: &str) -> String {
    format!("runtime:process:locker:{}:{}", sid, pid)
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process storage; expired entries are dropped lazily on access.
#[derive(Default)]
pub struct MemoryStorage {
    entries: DashMap<String, MemoryEntry>,
    locks: DashMap<String, Instant>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.is_expired())
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.entries
            .insert(key.to_string(), MemoryEntry::new(value.to_vec(), ttl));
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.entries.remove(*key);
        }
        Ok(())
    }

    fn lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut held) => {
                if *held.get() > now {
                    return Ok(false);
                }
                held.insert(now + ttl);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(now + ttl);
                Ok(true)
            }
        }
    }

    fn unlock(&self, key: &str) -> Result<()> {
        self.locks.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStorage
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct FileEnvelope {
    key: String,
    /// Unix seconds; absent means no expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
    value: serde_json::Value,
}

/// Directory-backed storage. Values must be JSON documents.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("locks"))?;
        Ok(Self { root })
    }

    fn file_name(key: &str) -> String {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{}.json", safe)
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(Self::file_name(key))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.root.join("locks").join(Self::file_name(key))
    }

    fn expiry(ttl: Option<Duration>) -> Option<i64> {
        ttl.map(|t| Utc::now().timestamp() + t.as_secs() as i64)
    }

    fn is_expired(expires_at: Option<i64>) -> bool {
        expires_at.is_some_and(|at| Utc::now().timestamp() >= at)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let envelope: FileEnvelope = serde_json::from_slice(&data)?;
        if Self::is_expired(envelope.expires_at) {
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(serde_json::to_vec(&envelope.value)?))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let value: serde_json::Value = serde_json::from_slice(value)
            .map_err(|e| Error::storage(format!("{} is not a JSON document: {}", key, e)))?;
        let envelope = FileEnvelope {
            key: key.to_string(),
            expires_at: Self::expiry(ttl),
            value,
        };
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&envelope)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            match std::fs::remove_file(self.path(key)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        let path = self.lock_path(key);
        if let Ok(data) = std::fs::read_to_string(&path) {
            let stale = data
                .trim()
                .parse::<i64>()
                .map(|at| Utc::now().timestamp() >= at)
                .unwrap_or(true);
            if !stale {
                return Ok(false);
            }
            let _ = std::fs::remove_file(&path);
        }
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path);
        match file {
            Ok(mut f) => {
                use std::io::Write;
                let expires = Self::expiry(Some(ttl)).unwrap_or_default();
                write!(f, "{}", expires)?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn unlock(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.lock_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
