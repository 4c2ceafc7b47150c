//! Memoization of expensive read operations.
//!
//! Lookups walk a chain of tiers: the caller's session, the process-wide
//! memory map, then the disk directory. A hit in a slower tier is copied into
//! every faster tier before it is returned.

mod disk;
mod key;
mod memory;
mod store;
mod tier;

pub use disk::DiskTier;
pub use key::{CacheKey, CallArgs, MAX_KEY_LEN};
pub use memory::{MemoryTier, SessionTier};
pub use store::{CachePolicy, CacheStats, MemoStore, ScopedMemo, SessionCache};
pub use tier::{CacheEntry, CacheTier, Lookup};
