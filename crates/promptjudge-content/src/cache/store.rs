use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::CacheError;
use crate::LoadedItem;

/// One cached item with its expiry metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub item: LoadedItem,
    pub created_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    pub size_bytes: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => age > ttl,
            Err(_) => false,
        }
    }

    pub fn meta(&self) -> EntryMeta {
        EntryMeta {
            key: self.key.clone(),
            created_at: self.created_at,
            ttl: self.ttl,
            size_bytes: self.size_bytes,
        }
    }
}

/// Entry metadata without the payload, used for eviction and stats
#[derive(Debug, Clone, PartialEq)]
pub struct EntryMeta {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
    pub size_bytes: u64,
}

impl EntryMeta {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => now.signed_duration_since(self.created_at) > ttl,
            Err(_) => false,
        }
    }
}

/// Flat key -> entry storage behind the cache
pub trait CacheStore: Send + Sync {
    /// `Err(CacheError::Corrupt)` when the entry exists but cannot be read
    fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    fn save(&mut self, entry: CacheEntry) -> Result<(), CacheError>;
    fn remove(&mut self, key: &str) -> Result<(), CacheError>;
    /// Metadata of every readable entry
    fn index(&self) -> Result<Vec<EntryMeta>, CacheError>;
    fn clear(&mut self) -> Result<(), CacheError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    fn index(&self) -> Result<Vec<EntryMeta>, CacheError> {
        Ok(self.entries.values().map(CacheEntry::meta).collect())
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }
}

/// One JSON file per entry under a directory
#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn read_entry(&self, path: &Path) -> Result<CacheEntry, CacheError> {
        let data = fs::read_to_string(path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|e| CacheError::Corrupt {
            key: path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
            reason: e.to_string(),
        })
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;
        Ok(entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect())
    }
}

impl CacheStore for DiskStore {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        self.read_entry(&path).map(Some)
    }

    fn save(&mut self, entry: CacheEntry) -> Result<(), CacheError> {
        let path = self.entry_path(&entry.key);
        let data = serde_json::to_string(&entry).map_err(|e| CacheError::Corrupt {
            key: entry.key.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&path, data).map_err(|source| CacheError::Io { path, source })
    }

    fn remove(&mut self, key: &str) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    fn index(&self) -> Result<Vec<EntryMeta>, CacheError> {
        let mut metas = Vec::new();
        for path in self.entry_files()? {
            match self.read_entry(&path) {
                Ok(entry) => metas.push(entry.meta()),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Removing unreadable cache entry");
                    if let Err(e) = fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %e, "Failed to remove cache entry");
                    }
                }
            }
        }
        Ok(metas)
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        for path in self.entry_files()? {
            fs::remove_file(&path).map_err(|source| CacheError::Io {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
