//! In-process cache tiers.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::trace;

use super::key::CacheKey;
use super::tier::{CacheEntry, CacheTier, Lookup};
use crate::error::Result;

/// Cache tier private to one session.
#[derive(Debug, Default)]
pub struct SessionTier {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl SessionTier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheTier for SessionTier {
    fn name(&self) -> &'static str {
        "session"
    }

    fn lookup(&self, key: &CacheKey, max_age: Duration, now: DateTime<Utc>) -> Result<Lookup> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(key) else {
            return Ok(Lookup::Miss);
        };
        if entry.is_fresh(now, max_age) {
            return Ok(Lookup::Hit(entry.clone()));
        }

        trace!(key = %key, tier = "session", "Evicting stale entry");
        entries.remove(key);
        Ok(Lookup::Miss)
    }

    fn store(&self, entry: &CacheEntry) -> Result<()> {
        self.entries.lock().insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn remove_matching(&self, pattern: Option<&str>) -> Result<usize> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        match pattern {
            Some(pattern) => entries.retain(|key, _| !key.matches(pattern)),
            None => entries.clear(),
        }
        Ok(before - entries.len())
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Process-wide cache tier shared by every session.
#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn lookup(&self, key: &CacheKey, max_age: Duration, now: DateTime<Utc>) -> Result<Lookup> {
        // Clone out so the shard lock is released before any removal
        let entry = match self.entries.get(key) {
            Some(entry) => entry.value().clone(),
            None => return Ok(Lookup::Miss),
        };

        if entry.is_fresh(now, max_age) {
            return Ok(Lookup::Hit(entry));
        }

        trace!(key = %key, tier = "memory", "Evicting stale entry");
        // A concurrent writer may have refreshed the entry in the meantime
        self.entries
            .remove_if(key, |_, current| !current.is_fresh(now, max_age));
        Ok(Lookup::Miss)
    }

    fn store(&self, entry: &CacheEntry) -> Result<()> {
        self.entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn remove_matching(&self, pattern: Option<&str>) -> Result<usize> {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = pattern.is_some_and(|pattern| !key.matches(pattern));
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
