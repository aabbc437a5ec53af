//! Key/value cache used for package scan results

use crate::Result;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Cache collaborator
///
/// Entries expire after their time to live. Refreshes are last-writer-wins.
pub trait Cache: Send + Sync {
    /// Fetch a live entry
    fn fetch(&self, key: &str) -> Option<Value>;

    /// Store an entry for `ttl`
    fn save(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Drop every entry
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Utc::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

/// Process local cache
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<FxHashMap<String, CacheEntry>>,
    hits: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fetches served from a live entry
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }
}

impl Cache for MemoryCache {
    fn fetch(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn save(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

/// Directory backed cache, one JSON file per key
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Entry file: SHA-256 of the key, so any key maps onto a safe file name
    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{}.json", digest))
    }
}

impl Cache for FileCache {
    fn fetch(&self, key: &str) -> Option<Value> {
        let path = self.entry_path(key);
        let content = fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Dropping unreadable cache entry {}: {}", path.display(), e);
                fs::remove_file(&path).ok();
                return None;
            }
        };

        if entry.is_live() {
            Some(entry.value)
        } else {
            debug!("Cache entry {} expired", key);
            fs::remove_file(&path).ok();
            None
        }
    }

    fn save(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string(&CacheEntry::new(value, ttl))?;
        fs::write(self.entry_path(key), content)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache.save("live", json!(["a"]), Duration::hours(1)).unwrap();
        cache.save("stale", json!(["b"]), Duration::seconds(-1)).unwrap();

        assert_eq!(cache.fetch("live"), Some(json!(["a"])));
        assert_eq!(cache.fetch("stale"), None);
        assert_eq!(cache.hits(), 1);

        cache.clear().unwrap();
        assert_eq!(cache.fetch("live"), None);
    }

    #[test]
    fn test_file_cache() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().join("cache"));

        assert_eq!(cache.fetch("extension.list"), None);
        cache
            .save("extension.list", json!(["blog", "shop"]), Duration::hours(2))
            .unwrap();
        assert_eq!(cache.fetch("extension.list"), Some(json!(["blog", "shop"])));
        assert_eq!(cache.fetch("template.list"), None);

        cache.clear().unwrap();
        assert_eq!(cache.fetch("extension.list"), None);
    }
}
