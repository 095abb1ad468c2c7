use crate::cache::{Cache, CacheValue, Expiry, TtlRemaining};
use crate::error::{CacheError, CacheResult};
use crate::local_cache::LocalCache;
use crate::remote_cache::RemoteCache;
use crate::stats::CacheStats;
use std::time::Duration;
use tracing::debug;

/// Two-tier cache: a [`LocalCache`] (L1) in front of a [`RemoteCache`] (L2).
///
/// # Read path
///
/// L1 hits return without a network round-trip. On an L1 miss the value is
/// read from L2 and promoted into L1 with a TTL capped at `local_ttl` and at
/// the L2 entry's own remaining lifetime.
///
/// # Write path
///
/// Writes go to L2 first, then L1. Evictions remove the L1 copy first; the
/// L2 eviction decides the outcome, because other processes can still see
/// the key until it is gone from L2.
///
/// Other processes' L1 copies are not invalidated. Staleness is bounded by
/// `local_ttl` only, which is why it must be finite.
pub struct MultiLevelCache {
    local: LocalCache,
    remote: RemoteCache,
    local_ttl: Duration,
    stats: CacheStats,
}

impl MultiLevelCache {
    /// Fails with [`CacheError::Configuration`] when `local_ttl` is missing
    /// or zero.
    pub fn new(local: LocalCache, remote: RemoteCache, local_ttl: Option<Duration>) -> CacheResult<Self> {
        let local_ttl = match local_ttl {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => {
                return Err(CacheError::configuration(
                    remote.name(),
                    "multi-level caches require a finite, non-zero local_ttl",
                ))
            }
        };
        Ok(Self {
            local,
            remote,
            local_ttl,
            stats: CacheStats::new(),
        })
    }

    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    pub fn remote(&self) -> &RemoteCache {
        &self.remote
    }

    pub fn local_ttl(&self) -> Duration {
        self.local_ttl
    }

    fn local_ttl_for(&self, ttl: Option<Duration>) -> Duration {
        ttl.map(|t| t.min(self.local_ttl)).unwrap_or(self.local_ttl)
    }
}

impl Cache for MultiLevelCache {
    fn name(&self) -> &str {
        self.remote.name()
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.remote.default_ttl()
    }

    fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        if let Some(value) = self.local.get(key)? {
            self.stats.record_hit();
            return Ok(Some(value));
        }

        let value = match self.remote.get(key)? {
            Some(value) => value,
            None => {
                self.stats.record_miss();
                return Ok(None);
            }
        };

        match self.remote.ttl_remaining(key)? {
            TtlRemaining::Expires(remaining) => {
                let ttl = self.local_ttl_for(Some(remaining));
                self.local.insert(key, value.clone(), Some(ttl));
                debug!(cache = %self.name(), key, ttl_ms = ttl.as_millis() as u64, "promoted to local tier");
            }
            TtlRemaining::NoExpiry => {
                self.local.insert(key, value.clone(), Some(self.local_ttl));
                debug!(cache = %self.name(), key, "promoted to local tier");
            }
            // Expired between the two calls; serve it once without promoting.
            TtlRemaining::Missing => {}
        }

        self.stats.record_hit();
        self.stats.record_remote_hit();
        Ok(Some(value))
    }

    fn put(&self, key: &str, value: CacheValue, ttl: Expiry) -> CacheResult<()> {
        let resolved = ttl.resolve(self.remote.default_ttl());
        self.remote.put(key, value.clone(), ttl)?;
        self.local.insert(key, value, Some(self.local_ttl_for(resolved)));
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: CacheValue, ttl: Expiry) -> CacheResult<bool> {
        let resolved = ttl.resolve(self.remote.default_ttl());
        let stored = self.remote.put_if_absent(key, value.clone(), ttl)?;
        if stored {
            self.local.insert(key, value, Some(self.local_ttl_for(resolved)));
        }
        Ok(stored)
    }

    fn evict(&self, key: &str) -> CacheResult<()> {
        self.local.evict(key)?;
        self.remote.evict(key)
    }

    fn evict_all(&self) -> CacheResult<()> {
        self.local.clear();
        self.remote.evict_all()
    }

    fn ttl_remaining(&self, key: &str) -> CacheResult<TtlRemaining> {
        self.remote.ttl_remaining(key)
    }

    fn touch_ttl(&self, key: &str, ttl: Expiry) -> CacheResult<bool> {
        let touched = self.remote.touch_ttl(key, ttl)?;
        if touched {
            let local = self.local_ttl_for(ttl.resolve(self.remote.default_ttl()));
            self.local.touch_ttl(key, Expiry::After(local))?;
        } else {
            self.local.evict(key)?;
        }
        Ok(touched)
    }

    fn contains_key(&self, key: &str) -> CacheResult<bool> {
        if self.local.contains_key(key)? {
            return Ok(true);
        }
        self.remote.contains_key(key)
    }

    fn size(&self) -> CacheResult<u64> {
        self.remote.size()
    }

    fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn local_tier(&self) -> Option<&LocalCache> {
        Some(&self.local)
    }
}
