//! The memoization store: a chain of cache tiers with read-through backfill.

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::disk::DiskTier;
use super::key::{CacheKey, CallArgs};
use super::memory::{MemoryTier, SessionTier};
use super::tier::{CacheEntry, CacheTier, Lookup};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;

/// Freshness and persistence settings for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Entries at least this old are treated as absent
    pub max_age: Duration,
    /// Also write results to persistent tiers
    pub persist: bool,
}

impl CachePolicy {
    /// Keep results in memory only.
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            persist: false,
        }
    }

    /// Keep results in memory and on disk.
    pub fn persisted(max_age: Duration) -> Self {
        Self {
            max_age,
            persist: true,
        }
    }
}

/// Hit/miss counters and tier sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_rate_percent: f64,
    pub session_entries: usize,
    pub memory_entries: usize,
    pub disk_entries: usize,
}

/// Cache state owned by one user session.
#[derive(Debug)]
pub struct SessionCache {
    id: Uuid,
    tier: SessionTier,
}

impl SessionCache {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            tier: SessionTier::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide memoization store.
///
/// Holds the shared tiers (memory first, then any persistent tiers) and the
/// hit/miss counters. Per-request access goes through [`MemoStore::session`],
/// which puts the caller's session tier at the head of the chain.
pub struct MemoStore {
    /// Shared tiers in lookup order
    shared: Vec<Box<dyn CacheTier>>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoStore {
    /// Create a store with only the process memory tier.
    pub fn new() -> Self {
        Self {
            shared: vec![Box::new(MemoryTier::new())],
            clock: Arc::new(SystemClock),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a store with the memory tier followed by a disk tier.
    pub fn with_disk(directory: impl Into<std::path::PathBuf>) -> Self {
        Self::new().with_tier(Box::new(DiskTier::new(directory)))
    }

    /// Create a store as described by `config`.
    pub fn from_config(config: &CacheConfig) -> Self {
        if config.disk_enabled {
            Self::with_disk(config.directory.clone())
        } else {
            Self::new()
        }
    }

    /// Append a tier to the end of the shared chain.
    pub fn with_tier(mut self, tier: Box<dyn CacheTier>) -> Self {
        self.shared.push(tier);
        self
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// View the store through `session`'s private tier.
    pub fn session<'a>(&'a self, session: &'a SessionCache) -> ScopedMemo<'a> {
        ScopedMemo {
            store: self,
            session,
        }
    }

    /// Clear the shared tiers without touching any session.
    pub fn clear_shared(&self, pattern: Option<&str>) -> usize {
        let tiers: Vec<&dyn CacheTier> = self
            .shared
            .iter()
            .map(|tier| &**tier as &dyn CacheTier)
            .collect();
        clear_tiers(&tiers, pattern)
    }

    /// Statistics for the shared tiers.
    pub fn shared_stats(&self) -> CacheStats {
        self.stats_with_session(0)
    }

    fn stats_with_session(&self, session_entries: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_rate_percent = if total_requests == 0 {
            0.0
        } else {
            hits as f64 / total_requests as f64 * 100.0
        };

        let (mut memory_entries, mut disk_entries) = (0, 0);
        for tier in &self.shared {
            if tier.persistent() {
                disk_entries += tier.len();
            } else {
                memory_entries += tier.len();
            }
        }

        CacheStats {
            hits,
            misses,
            total_requests,
            hit_rate_percent,
            session_entries,
            memory_entries,
            disk_entries,
        }
    }
}

impl Default for MemoStore {
    fn default() -> Self {
        Self::new()
    }
}

fn clear_tiers(tiers: &[&dyn CacheTier], pattern: Option<&str>) -> usize {
    let mut removed = 0;
    for tier in tiers {
        match tier.remove_matching(pattern) {
            Ok(n) => removed += n,
            Err(e) => warn!(tier = tier.name(), error = %e, "Cache clear failed"),
        }
    }
    removed
}

/// The memoization store as seen from one session.
pub struct ScopedMemo<'a> {
    store: &'a MemoStore,
    session: &'a SessionCache,
}

impl<'a> ScopedMemo<'a> {
    /// Session tier first, then the shared tiers.
    fn tiers(&self) -> Vec<&'a dyn CacheTier> {
        let mut tiers: Vec<&'a dyn CacheTier> = Vec::with_capacity(1 + self.store.shared.len());
        tiers.push(&self.session.tier);
        for tier in &self.store.shared {
            tiers.push(&**tier);
        }
        tiers
    }

    /// Find a fresh entry, backfilling faster tiers on a hit further down.
    ///
    /// A tier that fails is logged and skipped.
    fn find(&self, key: &CacheKey, max_age: Duration) -> Option<CacheEntry> {
        let now = self.store.clock.now();
        let tiers = self.tiers();

        for (depth, tier) in tiers.iter().enumerate() {
            match tier.lookup(key, max_age, now) {
                Ok(Lookup::Hit(entry)) => {
                    trace!(key = %key, tier = tier.name(), "Cache hit");
                    for faster in &tiers[..depth] {
                        if let Err(e) = faster.store(&entry) {
                            warn!(key = %key, tier = faster.name(), error = %e, "Cache backfill failed");
                        }
                    }
                    return Some(entry);
                }
                Ok(Lookup::Miss) => {}
                Err(e) => {
                    warn!(key = %key, tier = tier.name(), error = %e, "Cache tier unavailable, treating as miss");
                }
            }
        }
        None
    }

    /// Look up `key`, returning it only if younger than `max_age`.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey, max_age: Duration) -> Option<T> {
        let value = self.find(key, max_age).and_then(|entry| {
            serde_json::from_value(entry.value)
                .map_err(|e| warn!(key = %key, error = %e, "Cached value has unexpected shape"))
                .ok()
        });

        if value.is_some() {
            self.store.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            trace!(key = %key, "Cache miss");
            self.store.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Store `value` under `key` with a fresh timestamp.
    ///
    /// Persistent tiers are written only when `persist` is set. Failures are
    /// logged and otherwise ignored.
    pub fn set<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, persist: bool) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Value not cacheable");
                return;
            }
        };
        let entry = CacheEntry::new(key.clone(), value, self.store.clock.now());

        for tier in self.tiers() {
            if tier.persistent() && !persist {
                continue;
            }
            if let Err(e) = tier.store(&entry) {
                warn!(key = %key, tier = tier.name(), error = %e, "Cache write failed");
            }
        }
    }

    /// Return the cached result of `operation(args)`, computing and caching
    /// it on a miss.
    pub fn wrap<T, F>(&self, operation: &str, args: &CallArgs, policy: CachePolicy, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let key = CacheKey::derive(operation, args);
        if let Some(value) = self.get(&key, policy.max_age) {
            return value;
        }

        debug!(operation = %operation, key = %key, "Computing memoized result");
        let value = compute();
        self.set(&key, &value, policy.persist);
        value
    }

    /// Remove entries whose key contains `pattern` from every tier, or
    /// everything when `pattern` is `None`. Returns the number removed.
    pub fn clear(&self, pattern: Option<&str>) -> usize {
        let removed = clear_tiers(&self.tiers(), pattern);
        debug!(
            session = %self.session.id(),
            pattern = ?pattern,
            removed = removed,
            "Cache cleared"
        );
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats_with_session(self.session.tier.len())
    }
}
