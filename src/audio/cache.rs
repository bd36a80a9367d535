//! On-disk cache of synthesized speech, keyed by (text, voice, model).
//!
//! Files live as `<key>.wav` in one directory. The index is kept in memory
//! and rebuilt from file metadata at startup; there is no sidecar index, so
//! rebuilt entries carry empty text/voice/model.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub text: String,
    pub voice: String,
    pub model: String,
    pub file_path: PathBuf,
    pub size_bytes: u64,
    pub created_at: SystemTime,
    pub last_accessed: SystemTime,
    /// Recency order; rebuilt entries are numbered by access time.
    touched: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub dir: PathBuf,
    pub entries: usize,
    pub size_bytes: u64,
    pub max_entries: usize,
    pub max_size_bytes: u64,
}

/// Cache key: first 16 hex chars of SHA-256 over `text|voice|model`.
pub fn cache_key(text: &str, voice: &str, model: &str) -> String {
    let digest = Sha256::digest(format!("{text}|{voice}|{model}").as_bytes());
    let mut key = hex::encode(digest);
    key.truncate(16);
    key
}

pub struct AudioCache {
    dir: PathBuf,
    max_size_bytes: u64,
    max_entries: usize,
    index: HashMap<String, CacheEntry>,
    current_size: u64,
    clock: u64,
}

impl AudioCache {
    /// Open (creating if needed) the cache directory and index its files.
    pub fn open(dir: impl Into<PathBuf>, max_size_bytes: u64, max_entries: usize) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("Cannot create cache dir {}: {e}", dir.display());
        }
        let mut cache = Self {
            dir,
            max_size_bytes,
            max_entries,
            index: HashMap::new(),
            current_size: 0,
            clock: 0,
        };
        cache.rebuild();
        cache
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::open(config.dir(), config.max_size_mb * MB, config.max_entries)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    pub fn size_bytes(&self) -> u64 {
        self.current_size
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            dir: self.dir.clone(),
            entries: self.index.len(),
            size_bytes: self.current_size,
            max_entries: self.max_entries,
            max_size_bytes: self.max_size_bytes,
        }
    }

    /// Indexed entries, most recently used first.
    pub fn entries(&self) -> Vec<&CacheEntry> {
        let mut entries: Vec<_> = self.index.values().collect();
        entries.sort_by_key(|e| std::cmp::Reverse(e.touched));
        entries
    }

    #[cfg(test)]
    pub fn contains(&self, text: &str, voice: &str, model: &str) -> bool {
        self.index.contains_key(&cache_key(text, voice, model))
    }

    /// Cached audio, refreshing its recency. Stale or unreadable entries miss.
    pub fn get(&mut self, text: &str, voice: &str, model: &str) -> Option<Vec<u8>> {
        let key = cache_key(text, voice, model);
        let path = self.index.get(&key)?.file_path.clone();

        if !path.exists() {
            debug!("Cache entry {key} vanished from disk");
            self.forget(&key);
            return None;
        }

        match fs::read(&path) {
            Ok(bytes) => {
                let touched = self.tick();
                if let Some(entry) = self.index.get_mut(&key) {
                    entry.last_accessed = SystemTime::now();
                    entry.touched = touched;
                }
                debug!("Cache hit: {key}");
                Some(bytes)
            }
            Err(e) => {
                warn!("Failed to read cache file {}: {e}", path.display());
                None
            }
        }
    }

    /// Store audio, evicting least recently used entries first. Write failures
    /// are logged and swallowed.
    pub fn put(&mut self, text: &str, voice: &str, model: &str, audio: &[u8]) {
        let key = cache_key(text, voice, model);
        let size = audio.len() as u64;

        // Replacing a key releases its old accounting before capacity checks.
        if let Some(old) = self.index.remove(&key) {
            self.current_size = self.current_size.saturating_sub(old.size_bytes);
        }
        self.evict_if_needed(size);

        let file_path = self.dir.join(format!("{key}.wav"));
        if let Err(e) = fs::write(&file_path, audio) {
            warn!("Failed to write cache file {}: {e}", file_path.display());
            return;
        }

        let now = SystemTime::now();
        let touched = self.tick();
        self.index.insert(
            key.clone(),
            CacheEntry {
                key: key.clone(),
                text: text.to_string(),
                voice: voice.to_string(),
                model: model.to_string(),
                file_path,
                size_bytes: size,
                created_at: now,
                last_accessed: now,
                touched,
            },
        );
        self.current_size += size;
        debug!("Cached {key} ({size} bytes)");
    }

    /// Delete every tracked file and empty the index.
    pub fn clear(&mut self) {
        for entry in self.index.values() {
            if let Err(e) = fs::remove_file(&entry.file_path) {
                debug!("Failed to remove {}: {e}", entry.file_path.display());
            }
        }
        let count = self.index.len();
        self.index.clear();
        self.current_size = 0;
        info!("Cleared {count} cache entries");
    }

    fn evict_if_needed(&mut self, incoming: u64) {
        while !self.index.is_empty()
            && (self.index.len() >= self.max_entries
                || self.current_size + incoming > self.max_size_bytes)
        {
            let Some(oldest) = self
                .index
                .values()
                .min_by_key(|e| e.touched)
                .map(|e| e.key.clone())
            else {
                break;
            };
            if let Some(entry) = self.forget(&oldest) {
                if let Err(e) = fs::remove_file(&entry.file_path) {
                    debug!("Failed to remove evicted {}: {e}", entry.file_path.display());
                }
                debug!("Evicted {oldest}");
            }
        }
    }

    fn forget(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.index.remove(key)?;
        self.current_size = self.current_size.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn rebuild(&mut self) {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return;
        };

        let mut found: Vec<CacheEntry> = read_dir
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "wav"))
            .filter_map(|path| {
                let meta = fs::metadata(&path).ok()?;
                let key = path.file_stem()?.to_string_lossy().into_owned();
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                Some(CacheEntry {
                    key,
                    text: String::new(),
                    voice: String::new(),
                    model: String::new(),
                    size_bytes: meta.len(),
                    created_at: meta.created().unwrap_or(modified),
                    last_accessed: meta.accessed().unwrap_or(modified),
                    file_path: path,
                    touched: 0,
                })
            })
            .collect();

        found.sort_by_key(|e| e.last_accessed);
        for mut entry in found {
            entry.touched = self.tick();
            self.current_size += entry.size_bytes;
            self.index.insert(entry.key.clone(), entry);
        }

        if !self.index.is_empty() {
            info!(
                "Cache index rebuilt: {} entries, {} bytes",
                self.index.len(),
                self.current_size
            );
        }
    }
}
