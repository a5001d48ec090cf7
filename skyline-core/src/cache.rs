//! Short-lived read-through cache for resolved snapshots.
//!
//! Entries are immutable once written and only age out; there is no
//! invalidation beyond the TTL in [`CachePolicy`]. Expired entries stay
//! around for the retention period so they can be served stale, and are
//! evicted on the next write after that.

use std::{
    collections::HashMap,
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{model::LocationQuery, model::WeatherSnapshot, units::Units};

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// How long entries are kept for stale fallback.
pub const STALE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    units: Units,
}

impl CacheKey {
    pub fn new(query: &LocationQuery, units: Units) -> Self {
        Self {
            query: query.to_string().to_lowercase(),
            units,
        }
    }

    fn storage_key(&self) -> String {
        format!("{}|{}", self.units, self.query)
    }
}

/// A cache hit and how old it is.
#[derive(Debug, Clone)]
pub struct CachedSnapshot {
    pub snapshot: WeatherSnapshot,
    pub age: Duration,
}

/// Swappable snapshot store owned by the caller, not the resolver.
pub trait SnapshotCache: Send + Sync + Debug {
    fn get(&self, key: &CacheKey) -> Option<CachedSnapshot>;
    fn put(&self, key: CacheKey, snapshot: WeatherSnapshot);
}

#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub ttl: Duration,
    /// Serve an expired entry when every provider fails.
    pub serve_stale_on_failure: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            serve_stale_on_failure: false,
        }
    }
}

impl CachePolicy {
    pub fn is_fresh(&self, entry: &CachedSnapshot) -> bool {
        entry.age < self.ttl
    }

    /// Age after which a store may drop an entry.
    pub fn retention(&self) -> Duration {
        if self.serve_stale_on_failure {
            self.ttl.max(STALE_RETENTION)
        } else {
            self.ttl
        }
    }
}

#[derive(Debug)]
struct MemoryEntry {
    snapshot: WeatherSnapshot,
    stored_at: Instant,
}

/// In-process cache.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, MemoryEntry>>,
    max_age: Duration,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_max_age(STALE_RETENTION)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries older than `max_age` are evicted on the next `put`.
    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_age,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop entries older than `max_age`.
    pub fn purge_older_than(&self, max_age: Duration) {
        self.entries
            .lock()
            .retain(|_, e| e.stored_at.elapsed() < max_age);
    }
}

impl SnapshotCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CachedSnapshot> {
        self.entries.lock().get(key).map(|e| CachedSnapshot {
            snapshot: e.snapshot.clone(),
            age: e.stored_at.elapsed(),
        })
    }

    fn put(&self, key: CacheKey, snapshot: WeatherSnapshot) {
        self.purge_older_than(self.max_age);
        self.entries.lock().insert(
            key,
            MemoryEntry {
                snapshot,
                stored_at: Instant::now(),
            },
        );
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    stored_at: DateTime<Utc>,
    snapshot: WeatherSnapshot,
}

/// JSON file cache shared between runs of the CLI.
///
/// The whole file is loaded on open and rewritten on every `put`. Write
/// failures are logged; the in-memory copy stays usable.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    max_age: Duration,
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl FileCache {
    /// Open the cache at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "discarding unreadable cache file");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            max_age,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn persist(&self, entries: &HashMap<String, StoredEntry>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(entries)?)?;
        Ok(())
    }
}

fn age_of(stored_at: DateTime<Utc>) -> Duration {
    (Utc::now() - stored_at).to_std().unwrap_or(Duration::ZERO)
}

impl SnapshotCache for FileCache {
    fn get(&self, key: &CacheKey) -> Option<CachedSnapshot> {
        self.entries
            .lock()
            .get(&key.storage_key())
            .map(|e| CachedSnapshot {
                snapshot: e.snapshot.clone(),
                age: age_of(e.stored_at),
            })
    }

    fn put(&self, key: CacheKey, snapshot: WeatherSnapshot) {
        let mut entries = self.entries.lock();
        entries.retain(|_, e| age_of(e.stored_at) < self.max_age);
        entries.insert(
            key.storage_key(),
            StoredEntry {
                stored_at: Utc::now(),
                snapshot,
            },
        );

        if let Err(err) = self.persist(&entries) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to write cache file");
        }
    }
}
