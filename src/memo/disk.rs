//! On-disk cache tier.
//!
//! Each entry lives in `<directory>/<key>.cache` as a JSON document carrying
//! the key, the value and the time it was produced. The embedded timestamp,
//! not the file's modification time, decides freshness.

use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use super::key::CacheKey;
use super::tier::{CacheEntry, CacheTier, Lookup};
use crate::error::{Result, ToolyardError};

const EXTENSION: &str = "cache";

/// Cache tier persisted as one file per key.
#[derive(Debug, Clone)]
pub struct DiskTier {
    directory: PathBuf,
}

impl DiskTier {
    /// Create a tier rooted at `directory`. The directory is created on the
    /// first write.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(format!("{}.{}", key, EXTENSION))
    }

    /// Paths of every `.cache` file in the directory.
    fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        let read_dir = match fs::read_dir(&self.directory) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for dir_entry in read_dir {
            let path = dir_entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

/// Remove a file, treating "already gone" as success.
fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Best-effort removal of whatever sits at `path`, file or directory.
fn discard(path: &Path) {
    let removed = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    if let Err(e) = removed {
        debug!(path = %path.display(), error = %e, "Failed to discard unreadable entry");
    }
}

impl CacheTier for DiskTier {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn persistent(&self) -> bool {
        true
    }

    fn lookup(&self, key: &CacheKey, max_age: Duration, now: DateTime<Utc>) -> Result<Lookup> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Lookup::Miss),
            Err(e) => {
                // An entry that cannot be read is as useless as a corrupt one
                discard(&path);
                return Err(e.into());
            }
        };

        let entry = match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if entry.key == *key => entry,
            Ok(entry) => {
                remove_file(&path)?;
                return Err(ToolyardError::CorruptEntry {
                    key: key.to_string(),
                    reason: format!("file holds entry for {}", entry.key),
                });
            }
            Err(e) => {
                remove_file(&path)?;
                return Err(ToolyardError::CorruptEntry {
                    key: key.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        if entry.is_fresh(now, max_age) {
            return Ok(Lookup::Hit(entry));
        }

        trace!(key = %key, tier = "disk", "Deleting stale entry");
        remove_file(&path)?;
        Ok(Lookup::Miss)
    }

    fn store(&self, entry: &CacheEntry) -> Result<()> {
        fs::create_dir_all(&self.directory)?;

        let bytes = serde_json::to_vec(entry)?;
        // Write then rename so readers never observe a partial file
        let tmp = self
            .directory
            .join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let written = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, self.path_for(&entry.key)));
        if let Err(e) = written {
            discard(&tmp);
            return Err(e.into());
        }

        trace!(key = %entry.key, tier = "disk", "Entry persisted");
        Ok(())
    }

    fn remove_matching(&self, pattern: Option<&str>) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_paths()? {
            let matched = match pattern {
                Some(pattern) => path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.contains(pattern)),
                None => true,
            };
            if matched {
                remove_file(&path)?;
                removed += 1;
            }
        }

        debug!(
            directory = %self.directory.display(),
            removed = removed,
            "Removed persisted cache entries"
        );
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.entry_paths().map(|paths| paths.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, at: DateTime<Utc>) -> CacheEntry {
        CacheEntry::new(
            CacheKey::new(key).unwrap(),
            serde_json::json!({ "rows": [1, 2, 3], "key": key }),
            at,
        )
    }

    #[test]
    fn test_store_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::new(dir.path());
        let now = Utc::now();
        let e = entry("report_1", now);

        tier.store(&e).unwrap();

        assert!(dir.path().join("report_1.cache").is_file());
        let found = tier.lookup(&e.key, Duration::seconds(60), now).unwrap();
        assert_eq!(found, Lookup::Hit(e));
    }

    #[test]
    fn test_lookup_missing_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::new(dir.path().join("not-created-yet"));

        let found = tier
            .lookup(&CacheKey::new("k").unwrap(), Duration::seconds(60), Utc::now())
            .unwrap();
        assert_eq!(found, Lookup::Miss);
        assert_eq!(tier.len(), 0);
    }

    #[test]
    fn test_stale_entry_file_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::new(dir.path());
        let now = Utc::now();
        let e = entry("old", now - Duration::seconds(600));
        tier.store(&e).unwrap();

        let found = tier.lookup(&e.key, Duration::seconds(300), now).unwrap();

        assert_eq!(found, Lookup::Miss);
        assert!(!dir.path().join("old.cache").exists());
    }

    #[test]
    fn test_corrupt_file_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::new(dir.path());
        let path = dir.path().join("broken.cache");
        fs::write(&path, b"not json at all").unwrap();

        let result = tier.lookup(&CacheKey::new("broken").unwrap(), Duration::seconds(60), Utc::now());

        assert!(matches!(result, Err(ToolyardError::CorruptEntry { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn test_mismatched_key_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::new(dir.path());
        let now = Utc::now();
        tier.store(&entry("other", now)).unwrap();
        fs::rename(dir.path().join("other.cache"), dir.path().join("mine.cache")).unwrap();

        let result = tier.lookup(&CacheKey::new("mine").unwrap(), Duration::seconds(60), now);

        assert!(matches!(result, Err(ToolyardError::CorruptEntry { .. })));
        assert!(!dir.path().join("mine.cache").exists());
    }

    #[test]
    fn test_remove_matching_by_filename() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::new(dir.path());
        let now = Utc::now();
        tier.store(&entry("foo_1", now)).unwrap();
        tier.store(&entry("foo_2", now)).unwrap();
        tier.store(&entry("bar_1", now)).unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        assert_eq!(tier.len(), 3);
        assert_eq!(tier.remove_matching(Some("foo")).unwrap(), 2);
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.remove_matching(None).unwrap(), 1);
        assert!(tier.is_empty());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::new(dir.path());
        let now = Utc::now();
        tier.store(&entry("a", now)).unwrap();
        tier.store(&entry("a", now)).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    fn temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .count()
    }

    #[test]
    fn test_unreadable_entry_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::new(dir.path());
        let now = Utc::now();
        let path = dir.path().join("stuck.cache");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("inner"), b"x").unwrap();

        let result = tier.lookup(&CacheKey::new("stuck").unwrap(), Duration::seconds(60), now);

        assert!(matches!(result, Err(ToolyardError::Io(_))));
        assert!(!path.exists());

        // The slot is usable again
        let e = entry("stuck", now);
        tier.store(&e).unwrap();
        assert_eq!(tier.lookup(&e.key, Duration::seconds(60), now).unwrap(), Lookup::Hit(e));
    }

    #[test]
    fn test_failed_store_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::new(dir.path());
        // A non-empty directory in the way makes the rename fail
        let blocker = dir.path().join("blocked.cache");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("inner"), b"x").unwrap();

        assert!(tier.store(&entry("blocked", Utc::now())).is_err());
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[test]
    fn test_long_key_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::new(dir.path());
        let now = Utc::now();
        let e = CacheEntry::new(
            CacheKey::new("k".repeat(crate::memo::MAX_KEY_LEN)).unwrap(),
            serde_json::json!(1),
            now,
        );

        tier.store(&e).unwrap();

        assert_eq!(tier.len(), 1);
        assert_eq!(temp_files(dir.path()), 0);
    }
}
