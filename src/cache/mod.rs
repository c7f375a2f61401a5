//! Durable cache for on-chain values
//!
//! Entries carry their own freshness bounds (see [`EntryState`]). The
//! [`DurableCache`] front serves FRESH entries directly, serves STALE entries
//! while refreshing them in the background, and fetches synchronously when an
//! entry is expired or absent. Storage is SQLite when enabled, otherwise a
//! bounded in-memory map that is lost on restart.

pub mod clock;
pub mod database;
pub mod entry;
pub mod manager;
pub mod storage;

use crate::core::PreviewResult;
use chrono::{DateTime, Utc};

pub use clock::{Clock, ManualClock, SystemClock};
pub use database::SqliteStore;
pub use entry::{CacheEntry, EntryState};
pub use manager::{CacheLookup, CacheMetrics, Cached, DurableCache, ServedFrom};
pub use storage::MemoryStore;

/// Keyed storage backend. Implementations must be safe to share across tasks.
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &'static str;

    fn load(&self, key: &str) -> PreviewResult<Option<CacheEntry>>;

    /// Insert or replace the entry under `entry.key`
    fn save(&self, entry: &CacheEntry) -> PreviewResult<()>;

    /// Returns whether an entry was present
    fn remove(&self, key: &str) -> PreviewResult<bool>;

    /// Drop every entry that is no longer servable at `now`
    fn purge_expired(&self, now: DateTime<Utc>) -> PreviewResult<usize>;

    fn len(&self) -> PreviewResult<usize>;
}
