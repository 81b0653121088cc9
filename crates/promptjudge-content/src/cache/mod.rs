//! TTL cache in front of the content sources.
//!
//! Keys are [`ContentReference::cache_key`] digests, so the version is always
//! part of the key. Floating versions get a short TTL, commits a long one.
//! The cache is an optimisation only: every failure degrades to a miss.

mod clock;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{CacheEntry, CacheStore, DiskStore, EntryMeta, MemoryStore};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{ContentReference, LoadedItem};

/// Upper bound on evictions per insert
pub const MAX_EVICTIONS: usize = 10;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache entry {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub enabled: bool,
    /// TTL for `latest`, branches and tags
    #[serde(with = "humantime_serde")]
    pub floating_ttl: Duration,
    /// TTL for commit-pinned content
    #[serde(with = "humantime_serde")]
    pub pinned_ttl: Duration,
    pub max_bytes: u64,
    /// On-disk location; in-memory when absent
    pub dir: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            floating_ttl: Duration::from_secs(5 * 60),
            pinned_ttl: Duration::from_secs(6 * 60 * 60),
            max_bytes: 50 * 1024 * 1024,
            dir: None,
        }
    }
}

impl CacheSettings {
    pub fn ttl_for(&self, reference: &ContentReference) -> Duration {
        if reference.version.is_pinned() {
            self.pinned_ttl
        } else {
            self.floating_ttl
        }
    }
}

/// Default on-disk location under the user's cache directory
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("promptjudge").join("content"))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub expired: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct ContentCache {
    store: Box<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("settings", &self.settings)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

impl ContentCache {
    pub fn new(store: Box<dyn CacheStore>, settings: CacheSettings) -> Self {
        Self::with_clock(store, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Box<dyn CacheStore>,
        settings: CacheSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn in_memory(settings: CacheSettings) -> Self {
        Self::new(Box::new(MemoryStore::new()), settings)
    }

    /// Disk-backed when `settings.dir` is set, in-memory otherwise
    pub fn from_settings(settings: CacheSettings) -> Result<Self, CacheError> {
        match &settings.dir {
            Some(dir) => {
                let store = DiskStore::open(dir.clone())?;
                Ok(Self::new(Box::new(store), settings))
            }
            None => Ok(Self::in_memory(settings)),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn get(&mut self, reference: &ContentReference) -> Option<LoadedItem> {
        if !self.settings.enabled {
            return None;
        }
        let key = reference.cache_key();

        let entry = match self.store.load(&key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.misses += 1;
                return None;
            }
            Err(e) => {
                warn!(%reference, error = %e, "Dropping unreadable cache entry");
                self.discard(&key);
                self.misses += 1;
                return None;
            }
        };

        if entry.is_expired(self.clock.now()) {
            debug!(%reference, "Cache entry expired");
            self.discard(&key);
            self.misses += 1;
            return None;
        }

        self.hits += 1;
        Some(entry.item)
    }

    /// Insert with the TTL the settings assign to this reference's version
    pub fn put(&mut self, reference: &ContentReference, item: LoadedItem) -> bool {
        let ttl = self.settings.ttl_for(reference);
        self.put_with_ttl(reference, item, ttl)
    }

    /// Insert an item. Returns false when the item was not cached; that is
    /// never an error for the caller.
    pub fn put_with_ttl(
        &mut self,
        reference: &ContentReference,
        item: LoadedItem,
        ttl: Duration,
    ) -> bool {
        if !self.settings.enabled {
            return false;
        }
        let key = reference.cache_key();
        let size = item.size_bytes;

        if size > self.settings.max_bytes {
            debug!(%reference, size, max = self.settings.max_bytes, "Item larger than cache");
            return false;
        }

        let index = match self.store.index() {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Cache index unavailable, not caching");
                return false;
            }
        };

        let now = self.clock.now();
        let mut live: Vec<EntryMeta> = Vec::with_capacity(index.len());
        for meta in index {
            if meta.key == key || meta.is_expired(now) {
                self.discard(&meta.key);
            } else {
                live.push(meta);
            }
        }

        let mut total: u64 = live.iter().map(|m| m.size_bytes).sum();
        if total + size > self.settings.max_bytes {
            live.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));
            let mut attempts = 0;
            for meta in &live {
                if total + size <= self.settings.max_bytes || attempts >= MAX_EVICTIONS {
                    break;
                }
                attempts += 1;
                if self.discard(&meta.key) {
                    total -= meta.size_bytes;
                    self.evictions += 1;
                }
            }
            if total + size > self.settings.max_bytes {
                debug!(%reference, attempts, "Could not free enough cache space");
                return false;
            }
        }

        let entry = CacheEntry {
            key,
            item,
            created_at: now,
            ttl,
            size_bytes: size,
        };
        match self.store.save(entry) {
            Ok(()) => true,
            Err(e) => {
                warn!(%reference, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Evict oldest entries until `bytes` are freed or the eviction bound is
    /// hit. Returns the bytes actually freed.
    pub fn evict(&mut self, bytes: u64) -> u64 {
        let mut index = match self.store.index() {
            Ok(index) => index,
            Err(_) => return 0,
        };
        index.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));

        let mut freed = 0;
        for meta in index.iter().take(MAX_EVICTIONS) {
            if freed >= bytes {
                break;
            }
            if self.discard(&meta.key) {
                freed += meta.size_bytes;
                self.evictions += 1;
            }
        }
        freed
    }

    /// Physically remove expired entries; returns how many were removed
    pub fn sweep_expired(&mut self) -> usize {
        let now = self.clock.now();
        let expired: Vec<String> = match self.store.index() {
            Ok(index) => index
                .into_iter()
                .filter(|m| m.is_expired(now))
                .map(|m| m.key)
                .collect(),
            Err(_) => return 0,
        };
        expired.iter().filter(|key| self.discard(key)).count()
    }

    pub fn clear(&mut self) -> Result<(), CacheError> {
        self.store.clear()
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let index = self.store.index().unwrap_or_default();
        CacheStats {
            entries: index.len(),
            expired: index.iter().filter(|m| m.is_expired(now)).count(),
            total_bytes: index.iter().map(|m| m.size_bytes).sum(),
            max_bytes: self.settings.max_bytes,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    fn discard(&mut self, key: &str) -> bool {
        match self.store.remove(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Failed to remove cache entry");
                false
            }
        }
    }
}
