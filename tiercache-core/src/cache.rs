//! The contract shared by every cache tier.

use crate::error::CacheResult;
use crate::local_cache::LocalCache;
use crate::stats::CacheStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// The smallest TTL any tier will store. One millisecond is the time unit
/// of the engine (it matches the remote store's `PX` granularity).
pub const MIN_TTL: Duration = Duration::from_millis(1);

/// A cached value: real bytes or a tombstone.
///
/// A tombstone means "confirmed absent upstream". It is a hit, and it is
/// different from having no entry at all.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheValue {
    Present(Vec<u8>),
    Tombstone,
}

impl CacheValue {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, CacheValue::Tombstone)
    }

    /// Resolves the value to what a reader sees: bytes, or `None` for
    /// confirmed-absent.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            CacheValue::Present(bytes) => Some(bytes),
            CacheValue::Tombstone => None,
        }
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(bytes: Vec<u8>) -> Self {
        CacheValue::Present(bytes)
    }
}

impl From<&[u8]> for CacheValue {
    fn from(bytes: &[u8]) -> Self {
        CacheValue::Present(bytes.to_vec())
    }
}

/// Requested lifetime of a write.
///
/// A zero duration means "use the cache's configured default", never "keep
/// forever". `Never` is the only way to ask for no expiry.
///
/// # Examples
///
/// ```
/// use tiercache_core::Expiry;
/// use std::time::Duration;
///
/// assert_eq!(Expiry::from(Duration::ZERO), Expiry::Default);
/// assert_eq!(
///     Expiry::Default.resolve(Some(Duration::from_secs(60))),
///     Some(Duration::from_secs(60))
/// );
/// assert_eq!(Expiry::Never.resolve(Some(Duration::from_secs(60))), None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Expiry {
    #[default]
    Default,
    After(Duration),
    Never,
}

impl Expiry {
    /// Turns the request into a concrete TTL, `None` meaning no expiry.
    pub fn resolve(self, default_ttl: Option<Duration>) -> Option<Duration> {
        match self {
            Expiry::Default => default_ttl,
            Expiry::After(ttl) if ttl.is_zero() => default_ttl,
            Expiry::After(ttl) => Some(ttl),
            Expiry::Never => None,
        }
    }
}

impl From<Duration> for Expiry {
    fn from(ttl: Duration) -> Self {
        if ttl.is_zero() {
            Expiry::Default
        } else {
            Expiry::After(ttl)
        }
    }
}

impl From<Option<Duration>> for Expiry {
    fn from(ttl: Option<Duration>) -> Self {
        ttl.map(Expiry::from).unwrap_or(Expiry::Default)
    }
}

/// Remaining lifetime of a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtlRemaining {
    /// There is no live entry for the key.
    Missing,
    /// The entry exists and never expires.
    NoExpiry,
    Expires(Duration),
}

impl TtlRemaining {
    /// The remaining duration, `None` both for missing keys and for keys
    /// without expiry. Match on the enum to tell those apart.
    pub fn duration(self) -> Option<Duration> {
        match self {
            TtlRemaining::Expires(d) => Some(d),
            TtlRemaining::Missing | TtlRemaining::NoExpiry => None,
        }
    }

    pub fn is_missing(self) -> bool {
        matches!(self, TtlRemaining::Missing)
    }
}

/// Loader invoked on a miss. `Ok(None)` means "not found upstream".
pub type Loader<'a> = dyn FnMut() -> CacheResult<Option<Vec<u8>>> + 'a;

/// A named cache tier.
///
/// Implementations are internally synchronized: callers never lock around
/// these methods. Keys are already-resolved cache keys (see
/// [`CacheKey`](crate::CacheKey)).
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    /// TTL applied to writes that ask for [`Expiry::Default`].
    fn default_ttl(&self) -> Option<Duration>;

    /// Looks a key up. `Ok(None)` is a miss; a tombstone is a hit.
    fn get(&self, key: &str) -> CacheResult<Option<CacheValue>>;

    fn put(&self, key: &str, value: CacheValue, ttl: Expiry) -> CacheResult<()>;

    /// Stores the value only when no live entry exists. Returns whether it
    /// was stored.
    fn put_if_absent(&self, key: &str, value: CacheValue, ttl: Expiry) -> CacheResult<bool>;

    /// Removes a key. Evicting a missing key is a no-op.
    fn evict(&self, key: &str) -> CacheResult<()>;

    fn evict_all(&self) -> CacheResult<()>;

    fn ttl_remaining(&self, key: &str) -> CacheResult<TtlRemaining>;

    /// Resets the lifetime of a live entry. Returns `false` for missing keys.
    fn touch_ttl(&self, key: &str, ttl: Expiry) -> CacheResult<bool>;

    fn contains_key(&self, key: &str) -> CacheResult<bool>;

    /// Number of live entries.
    fn size(&self) -> CacheResult<u64>;

    fn stats(&self) -> &CacheStats;

    /// The in-process tier in front of a remote one, if this cache has one.
    fn local_tier(&self) -> Option<&LocalCache> {
        None
    }

    /// Reads through the cache, calling `loader` exactly once on a miss.
    ///
    /// A loaded value is written with the default TTL. A "not found" result
    /// is returned as-is and not cached; tombstoning belongs to penetration
    /// protection. A tombstone hit resolves to `None` without calling the
    /// loader.
    fn get_or_load(&self, key: &str, loader: &mut Loader<'_>) -> CacheResult<Option<Vec<u8>>> {
        if let Some(hit) = self.get(key)? {
            return Ok(hit.into_bytes());
        }
        self.stats().record_load();
        let loaded = loader()?;
        if let Some(bytes) = &loaded {
            self.put(key, CacheValue::Present(bytes.clone()), Expiry::Default)?;
        }
        Ok(loaded)
    }

    fn multi_get(&self, keys: &[&str]) -> CacheResult<HashMap<String, CacheValue>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key)? {
                found.insert(key.to_string(), value);
            }
        }
        Ok(found)
    }

    fn multi_put(&self, entries: Vec<(String, CacheValue)>, ttl: Expiry) -> CacheResult<()> {
        for (key, value) in entries {
            self.put(&key, value, ttl)?;
        }
        Ok(())
    }
}
