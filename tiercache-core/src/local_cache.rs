use crate::cache::{Cache, CacheValue, Expiry, TtlRemaining};
use crate::clock::Clock;
use crate::error::CacheResult;
use crate::utils::{move_key_to_end, pop_lru, purge_expired, remove_key};
use crate::{CacheEntry, CacheStats};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Settings of a [`LocalCache`].
#[derive(Clone, Debug, PartialEq)]
pub struct LocalCacheConfig {
    pub max_entries: usize,
    /// Write TTL used for [`Expiry::Default`]. `None` means no expiry.
    pub default_ttl: Option<Duration>,
    /// Idle expiry measured from the last read.
    pub access_ttl: Option<Duration>,
}

/// Bounded, TTL-aware in-process cache tier.
///
/// Entries live in a `RwLock<HashMap>` and recency is tracked in a
/// `Mutex<VecDeque>` (front = least recently used).
///
/// # Eviction Order
///
/// When an insert pushes the cache over `max_entries`, expired entries are
/// purged first and only then is the least recently used live entry evicted.
/// Expired entries are also removed lazily by readers.
///
/// # Thread Safety
///
/// Reads take the map's read lock. Lock order is always order queue before
/// map, so writers never deadlock against each other.
///
/// # Examples
///
/// ```
/// use tiercache_core::{Cache, CacheValue, Expiry, LocalCache, LocalCacheConfig, system_clock};
/// use std::time::Duration;
///
/// let cache = LocalCache::new(
///     "users",
///     LocalCacheConfig {
///         max_entries: 2,
///         default_ttl: Some(Duration::from_secs(60)),
///         access_ttl: None,
///     },
///     system_clock(),
/// );
///
/// cache.put("u:1", CacheValue::Present(b"alice".to_vec()), Expiry::Default).unwrap();
/// assert_eq!(
///     cache.get("u:1").unwrap(),
///     Some(CacheValue::Present(b"alice".to_vec()))
/// );
/// ```
pub struct LocalCache {
    name: String,
    map: RwLock<HashMap<String, CacheEntry>>,
    order: Mutex<VecDeque<String>>,
    config: LocalCacheConfig,
    clock: Arc<dyn Clock>,
    stats: CacheStats,
}

impl LocalCache {
    pub fn new(name: &str, config: LocalCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.to_string(),
            map: RwLock::new(HashMap::new()),
            order: Mutex::new(VecDeque::new()),
            config,
            clock,
            stats: CacheStats::new(),
        }
    }

    pub fn config(&self) -> &LocalCacheConfig {
        &self.config
    }

    /// Inserts with an already-resolved TTL (`None` = no expiry).
    pub(crate) fn insert(&self, key: &str, value: CacheValue, ttl: Option<Duration>) {
        let now = self.clock.now();
        let entry = CacheEntry::new(value, now, ttl);

        let mut o = self.order.lock();
        let mut m = self.map.write();
        m.insert(key.to_string(), entry);
        if let Some(pos) = o.iter().position(|k| k == key) {
            o.remove(pos);
        }
        o.push_back(key.to_string());

        if m.len() > self.config.max_entries {
            let purged = purge_expired(&mut m, &mut o, now, self.config.access_ttl);
            for _ in 0..purged {
                self.stats.record_eviction();
            }
            while m.len() > self.config.max_entries {
                match pop_lru(&mut m, &mut o) {
                    Some(evicted) => {
                        self.stats.record_eviction();
                        debug!(cache = %self.name, key = %evicted, "evicted least recently used entry");
                    }
                    None => break,
                }
            }
        }
    }

    fn remove_expired(&self, key: &str) {
        let mut o = self.order.lock();
        let mut m = self.map.write();
        let now = self.clock.now();
        // Re-check under the write lock; a writer may have replaced the entry.
        let still_expired = m
            .get(key)
            .map(|e| e.is_expired(now, self.config.access_ttl))
            .unwrap_or(false);
        if still_expired {
            remove_key(&mut m, &mut o, key);
            self.stats.record_eviction();
        }
    }

    /// Removes every entry without touching statistics.
    pub fn clear(&self) {
        let mut o = self.order.lock();
        let mut m = self.map.write();
        m.clear();
        o.clear();
    }
}

impl Cache for LocalCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.config.default_ttl
    }

    fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        let now = self.clock.now();
        let mut expired = false;
        let mut result = None;

        {
            let m = self.map.read();
            if let Some(entry) = m.get(key) {
                if entry.is_expired(now, self.config.access_ttl) {
                    expired = true;
                } else {
                    result = Some(entry.value.clone());
                }
            }
        }

        if expired {
            self.remove_expired(key);
            self.stats.record_miss();
            return Ok(None);
        }

        match &result {
            Some(_) => {
                self.stats.record_hit();
                move_key_to_end(&mut self.order.lock(), key);
                if self.config.access_ttl.is_some() {
                    if let Some(entry) = self.map.write().get_mut(key) {
                        entry.touch(now);
                    }
                }
            }
            None => self.stats.record_miss(),
        }

        Ok(result)
    }

    fn put(&self, key: &str, value: CacheValue, ttl: Expiry) -> CacheResult<()> {
        self.insert(key, value, ttl.resolve(self.config.default_ttl));
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: CacheValue, ttl: Expiry) -> CacheResult<bool> {
        let now = self.clock.now();
        {
            let m = self.map.read();
            if let Some(entry) = m.get(key) {
                if !entry.is_expired(now, self.config.access_ttl) {
                    return Ok(false);
                }
            }
        }
        // Racing writers may both pass the check above; the later insert wins,
        // matching last-write-wins population.
        self.insert(key, value, ttl.resolve(self.config.default_ttl));
        Ok(true)
    }

    fn evict(&self, key: &str) -> CacheResult<()> {
        let mut o = self.order.lock();
        let mut m = self.map.write();
        remove_key(&mut m, &mut o, key);
        Ok(())
    }

    fn evict_all(&self) -> CacheResult<()> {
        self.clear();
        Ok(())
    }

    fn ttl_remaining(&self, key: &str) -> CacheResult<TtlRemaining> {
        let now = self.clock.now();
        let m = self.map.read();
        Ok(match m.get(key) {
            Some(entry) => entry.remaining(now, self.config.access_ttl),
            None => TtlRemaining::Missing,
        })
    }

    fn touch_ttl(&self, key: &str, ttl: Expiry) -> CacheResult<bool> {
        let now = self.clock.now();
        let mut m = self.map.write();
        match m.get_mut(key) {
            Some(entry) if !entry.is_expired(now, self.config.access_ttl) => {
                entry.expires_at = ttl.resolve(self.config.default_ttl).map(|t| now + t);
                entry.touch(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn contains_key(&self, key: &str) -> CacheResult<bool> {
        let now = self.clock.now();
        Ok(self
            .map
            .read()
            .get(key)
            .map(|e| !e.is_expired(now, self.config.access_ttl))
            .unwrap_or(false))
    }

    fn size(&self) -> CacheResult<u64> {
        let now = self.clock.now();
        Ok(self
            .map
            .read()
            .values()
            .filter(|e| !e.is_expired(now, self.config.access_ttl))
            .count() as u64)
    }

    fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
