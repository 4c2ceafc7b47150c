//! Storage tier abstraction for the memoization store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::key::CacheKey;
use crate::error::Result;

/// A cached value and the time it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, value: serde_json::Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            key,
            value,
            timestamp,
        }
    }

    /// Fresh means strictly younger than `max_age` at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.timestamp) < max_age
    }
}

/// Result of asking one tier for a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(CacheEntry),
    Miss,
}

/// One level of the lookup chain.
///
/// A tier evicts a stale entry it finds during `lookup` and reports a miss.
/// An `Err` means the tier could not answer; the store treats it as a miss.
pub trait CacheTier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the tier outlives the process. Persistent tiers are only
    /// written when the caller asks for persistence.
    fn persistent(&self) -> bool {
        false
    }

    fn lookup(&self, key: &CacheKey, max_age: Duration, now: DateTime<Utc>) -> Result<Lookup>;

    /// Insert or replace the entry for `entry.key`.
    fn store(&self, entry: &CacheEntry) -> Result<()>;

    /// Remove entries whose key contains `pattern`, or all entries when
    /// `pattern` is `None`. Returns how many were removed.
    fn remove_matching(&self, pattern: Option<&str>) -> Result<usize>;

    /// Number of entries currently held, fresh or not.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_is_strict() {
        let now = Utc::now();
        let entry = CacheEntry::new(
            CacheKey::new("k").unwrap(),
            serde_json::json!(1),
            now - Duration::seconds(300),
        );

        assert!(entry.is_fresh(now, Duration::seconds(301)));
        assert!(!entry.is_fresh(now, Duration::seconds(300)));
        assert!(!entry.is_fresh(now, Duration::zero()));
    }

    #[test]
    fn test_zero_max_age_is_never_fresh() {
        let now = Utc::now();
        let entry = CacheEntry::new(CacheKey::new("k").unwrap(), serde_json::json!(1), now);
        assert!(!entry.is_fresh(now, Duration::zero()));
    }
}
