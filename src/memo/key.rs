//! Cache key derivation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, ToolyardError};

/// Longest accepted key. Leaves room for the `.cache` suffix under the
/// usual 255-byte file name limit.
pub const MAX_KEY_LEN: usize = 200;

/// Longest readable operation prefix kept in a derived key.
const MAX_PREFIX_LEN: usize = 64;

/// Identifies one cached result.
///
/// Keys double as disk file stems, so they are restricted to at most
/// [`MAX_KEY_LEN`] ASCII alphanumerics, `_`, `-` and `.`, and may not start
/// with `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Use `raw` verbatim as a key.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty()
            || raw.len() > MAX_KEY_LEN
            || raw.starts_with('.')
            || !raw.chars().all(is_key_char)
        {
            return Err(ToolyardError::InvalidKey(raw));
        }
        Ok(Self(raw))
    }

    /// Derive the key for `operation` invoked with `args`.
    ///
    /// The key is the sanitized operation name, cut to its first 64
    /// characters, followed by a SHA-256 digest of the full operation name and
    /// the canonical argument string.
    pub fn derive(operation: &str, args: &CallArgs) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        hasher.update(b":");
        hasher.update(args.canonical().as_bytes());
        let digest = hex::encode(hasher.finalize());

        let prefix: String = operation
            .trim_start_matches('.')
            .chars()
            .map(|c| if is_key_char(c) { c } else { '_' })
            .take(MAX_PREFIX_LEN)
            .collect();

        if prefix.is_empty() {
            Self(digest)
        } else {
            Self(format!("{}-{}", prefix, digest))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key contains `pattern`.
    pub fn matches(&self, pattern: &str) -> bool {
        self.0.contains(pattern)
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = ToolyardError;

    fn try_from(raw: String) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Arguments of a memoized call.
///
/// Positional arguments keep their order; keyword arguments are kept sorted
/// by name so the order they were supplied in does not affect the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    positional: Vec<String>,
    keyword: BTreeMap<String, String>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.positional.push(value.to_string());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.keyword.insert(name.to_string(), value.to_string());
        self
    }

    /// Canonical string form used for hashing.
    pub fn canonical(&self) -> String {
        // Debug formatting quotes and escapes each value, so
        // ["a,b"] and ["a", "b"] stay distinct
        format!("{:?}|{:?}", self.positional, self.keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_accepts_safe_keys() {
        assert_eq!(CacheKey::new("dashboard_metrics-1").unwrap().as_str(), "dashboard_metrics-1");
        assert!(CacheKey::new("v1.2").is_ok());
    }

    #[test]
    fn test_new_rejects_unsafe_keys() {
        assert!(CacheKey::new("").is_err());
        assert!(CacheKey::new(".hidden").is_err());
        assert!(CacheKey::new("../etc/passwd").is_err());
        assert!(CacheKey::new("a b").is_err());
    }

    #[test]
    fn test_derive_is_deterministic() {
        let args = CallArgs::new().arg(42).kwarg("site", "north");
        let key1 = CacheKey::derive("reports::load", &args);
        let key2 = CacheKey::derive("reports::load", &args.clone());
        assert_eq!(key1, key2);
        assert!(key1.as_str().starts_with("reports__load-"));
    }

    #[test]
    fn test_keyword_order_does_not_matter() {
        let a = CallArgs::new().arg("2024").kwarg("site", "north").kwarg("kind", "drill");
        let b = CallArgs::new().arg("2024").kwarg("kind", "drill").kwarg("site", "north");
        assert_eq!(CacheKey::derive("op", &a), CacheKey::derive("op", &b));
    }

    #[test]
    fn test_positional_order_matters() {
        let a = CallArgs::new().arg(1).arg(2);
        let b = CallArgs::new().arg(2).arg(1);
        assert_ne!(CacheKey::derive("op", &a), CacheKey::derive("op", &b));
    }

    #[test]
    fn test_argument_boundaries_are_preserved() {
        let a = CallArgs::new().arg("a,b");
        let b = CallArgs::new().arg("a").arg("b");
        assert_ne!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_operation_is_part_of_key() {
        let args = CallArgs::new();
        assert_ne!(CacheKey::derive("op_a", &args), CacheKey::derive("op_b", &args));
    }

    #[test]
    fn test_derived_key_is_valid_file_stem() {
        let key = CacheKey::derive(".weird name/with:chars", &CallArgs::new());
        assert!(CacheKey::new(key.as_str()).is_ok());
    }

    #[test]
    fn test_new_rejects_overlong_key() {
        assert!(CacheKey::new("k".repeat(MAX_KEY_LEN)).is_ok());
        assert!(CacheKey::new("k".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn test_long_operation_name_is_bounded() {
        let operation = "dashboard_".repeat(30);
        let key = CacheKey::derive(&operation, &CallArgs::new());

        assert_eq!(key.as_str().len(), MAX_PREFIX_LEN + 1 + 64);
        assert!(key.as_str().starts_with(&operation[..MAX_PREFIX_LEN]));
        assert!(CacheKey::new(key.as_str()).is_ok());

        // Names sharing the kept prefix still get distinct keys
        let other = format!("{}x", operation);
        assert_ne!(key, CacheKey::derive(&other, &CallArgs::new()));
    }

    #[test]
    fn test_serde_rejects_invalid_key() {
        assert!(serde_json::from_str::<CacheKey>("\"../x\"").is_err());
        let key: CacheKey = serde_json::from_str("\"ok_key\"").unwrap();
        assert_eq!(key.as_str(), "ok_key");
    }
}
