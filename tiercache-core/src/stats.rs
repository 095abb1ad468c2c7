use std::sync::atomic::{AtomicU64, Ordering};

/// Per-cache counters for monitoring hit rates and protection activity.
///
/// All counters are atomics updated with `Relaxed` ordering; a snapshot is
/// therefore approximate under concurrent writes but never torn per counter.
///
/// # Examples
///
/// ```
/// use tiercache_core::CacheStats;
///
/// let stats = CacheStats::new();
/// stats.record_hit();
/// stats.record_hit();
/// stats.record_miss();
///
/// assert_eq!(stats.total_accesses(), 3);
/// assert!((stats.hit_rate() - 0.6666).abs() < 0.001);
/// ```
#[derive(Debug)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    remote_hits: AtomicU64,
    loads: AtomicU64,
    tombstone_hits: AtomicU64,
    lock_timeouts: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            remote_hits: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            tombstone_hits: AtomicU64::new(0),
            lock_timeouts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A hit served by the remote tier and promoted into the local one.
    #[inline]
    pub fn record_remote_hit(&self) {
        self.remote_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// The loader was invoked.
    #[inline]
    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tombstone_hit(&self) {
        self.tombstone_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// An entry was removed by capacity or expiry eviction.
    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn remote_hits(&self) -> u64 {
        self.remote_hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn tombstone_hits(&self) -> u64 {
        self.tombstone_hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn lock_timeouts(&self) -> u64 {
        self.lock_timeouts.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total_accesses(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Fraction of lookups that hit (0.0 when nothing was looked up).
    #[inline]
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    #[inline]
    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }

    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.remote_hits,
            &self.loads,
            &self.tombstone_hits,
            &self.lock_timeouts,
            &self.evictions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CacheStats {
    fn clone(&self) -> Self {
        Self {
            hits: AtomicU64::new(self.hits()),
            misses: AtomicU64::new(self.misses()),
            remote_hits: AtomicU64::new(self.remote_hits()),
            loads: AtomicU64::new(self.loads()),
            tombstone_hits: AtomicU64::new(self.tombstone_hits()),
            lock_timeouts: AtomicU64::new(self.lock_timeouts()),
            evictions: AtomicU64::new(self.evictions()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_no_accesses() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 1.0);
    }

    #[test]
    fn test_reset_clears_every_counter() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();
        stats.record_remote_hit();
        stats.record_load();
        stats.record_tombstone_hit();
        stats.record_lock_timeout();
        stats.record_eviction();

        stats.reset();
        assert_eq!(stats.total_accesses(), 0);
        assert_eq!(stats.remote_hits(), 0);
        assert_eq!(stats.loads(), 0);
        assert_eq!(stats.tombstone_hits(), 0);
        assert_eq!(stats.lock_timeouts(), 0);
        assert_eq!(stats.evictions(), 0);
    }

    #[test]
    fn test_clone_is_independent() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_load();

        let cloned = stats.clone();
        stats.record_hit();
        assert_eq!(stats.hits(), 2);
        assert_eq!(cloned.hits(), 1);
        assert_eq!(cloned.loads(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(CacheStats::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record_hit();
                    }
                    for _ in 0..50 {
                        stats.record_miss();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.hits(), 1000);
        assert_eq!(stats.misses(), 500);
        assert!((stats.hit_rate() - 0.6666).abs() < 0.001);
    }
}
