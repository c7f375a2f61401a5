// In-memory fallback store, scoped to the process lifetime

use super::entry::{CacheEntry, EntryState};
use super::CacheStore;
use crate::core::PreviewResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

struct StoredEntry {
    entry: CacheEntry,
    last_accessed: Instant,
}

/// Bounded map with least-recently-used eviction
pub struct MemoryStore {
    data: Mutex<HashMap<String, StoredEntry>>,
    max_size: usize,
}

impl MemoryStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            max_size: max_size.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self, key: &str) -> PreviewResult<Option<CacheEntry>> {
        let mut data = self.data.lock();
        Ok(data.get_mut(key).map(|stored| {
            stored.last_accessed = Instant::now();
            stored.entry.clone()
        }))
    }

    fn save(&self, entry: &CacheEntry) -> PreviewResult<()> {
        let mut data = self.data.lock();

        if data.len() >= self.max_size && !data.contains_key(&entry.key) {
            let lru_key = data
                .iter()
                .min_by_key(|(_, stored)| stored.last_accessed)
                .map(|(k, _)| k.clone());
            if let Some(lru_key) = lru_key {
                data.remove(&lru_key);
            }
        }

        data.insert(
            entry.key.clone(),
            StoredEntry {
                entry: entry.clone(),
                last_accessed: Instant::now(),
            },
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> PreviewResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> PreviewResult<usize> {
        let mut data = self.data.lock();
        let before = data.len();
        data.retain(|_, stored| stored.entry.state_at(now) != EntryState::Expired);
        Ok(before - data.len())
    }

    fn len(&self) -> PreviewResult<usize> {
        Ok(self.data.lock().len())
    }
}
