//! Per-file TTL cache of loaded grids.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::grid::{FileSource, SheetGrid, SheetSelector};

/// Cache limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a file entry stays valid after it is first inserted.
    pub ttl: Duration,
    /// Maximum number of file entries.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            max_entries: 50,
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// All sheets loaded for one file.
#[derive(Debug)]
struct CacheEntry {
    sheets: HashMap<String, Arc<SheetGrid>>,
    inserted_at: Instant,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            sheets: HashMap::new(),
            inserted_at: Instant::now(),
        }
    }

    fn is_live(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() < ttl
    }
}

fn sheet_key(sheet: &SheetSelector) -> String {
    match sheet {
        SheetSelector::Name(name) => name.trim().to_lowercase(),
        SheetSelector::Index(idx) => format!("#{}", idx),
    }
}

/// Shared grid cache keyed by file id.
///
/// Entries are kept in insertion order so eviction drops the oldest file
/// first. Loading happens outside the lock; only the lookup and the
/// insert-then-evict step hold it.
#[derive(Debug, Default)]
pub struct DataCache {
    config: CacheConfig,
    entries: Mutex<IndexMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl DataCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, CacheEntry>> {
        // A panicking holder cannot leave an entry half-written, so the map
        // stays usable after poisoning.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the cached grid or load it from `source`.
    ///
    /// The boolean is `true` on a cache hit. `force_refresh` bypasses the
    /// lookup and replaces the file entry.
    pub fn get_or_load(
        &self,
        source: &dyn FileSource,
        access_token: &str,
        file_id: &str,
        sheet: &SheetSelector,
        force_refresh: bool,
    ) -> Result<(Arc<SheetGrid>, bool)> {
        let key = sheet_key(sheet);

        if !force_refresh {
            if let Some(grid) = self.lookup(file_id, &key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(file_id, sheet = %sheet, "cache hit");
                return Ok((grid, true));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(file_id, sheet = %sheet, force_refresh, "cache miss, loading");
        let grid = Arc::new(source.load(access_token, file_id, sheet)?);
        self.insert(file_id, key, Arc::clone(&grid), force_refresh);
        Ok((grid, false))
    }

    fn lookup(&self, file_id: &str, key: &str) -> Option<Arc<SheetGrid>> {
        let entries = self.lock();
        let entry = entries.get(file_id)?;
        if !entry.is_live(self.config.ttl) {
            return None;
        }
        entry.sheets.get(key).cloned()
    }

    fn insert(&self, file_id: &str, key: String, grid: Arc<SheetGrid>, force_refresh: bool) {
        let ttl = self.config.ttl;
        let mut entries = self.lock();

        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(ttl));
        let expired = before - entries.len();

        let live = !force_refresh && entries.contains_key(file_id);
        if live {
            if let Some(entry) = entries.get_mut(file_id) {
                entry.sheets.insert(key, grid);
            }
        } else {
            // Re-inserting moves the file to the back of the eviction order.
            entries.shift_remove(file_id);
            let mut entry = CacheEntry::new();
            entry.sheets.insert(key, grid);
            entries.insert(file_id.to_string(), entry);
        }

        let mut evicted = 0;
        while entries.len() > self.config.max_entries.max(1) {
            entries.shift_remove_index(0);
            evicted += 1;
        }

        let dropped = (expired + evicted) as u64;
        if dropped > 0 {
            self.evictions.fetch_add(dropped, Ordering::Relaxed);
            debug!(expired, evicted, remaining = entries.len(), "cache evictions");
        }
    }

    /// Drop every sheet of a file. Returns whether an entry existed.
    pub fn invalidate(&self, file_id: &str) -> bool {
        self.lock().shift_remove(file_id).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of file entries, expired ones included until the next write.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
