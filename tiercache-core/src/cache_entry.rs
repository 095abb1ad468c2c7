use crate::cache::{CacheValue, TtlRemaining};
use std::time::{Duration, Instant};

/// A value held by the local tier together with its expiry bookkeeping.
///
/// An entry whose deadline has passed is logically absent even while it is
/// still physically in the map; readers remove it lazily and inserts purge
/// it before evicting live entries.
///
/// # Fields
///
/// * `value` - The cached bytes or a tombstone
/// * `inserted_at` - When the entry was written
/// * `expires_at` - Write-TTL deadline, `None` for no expiry
/// * `last_access` - Last read, used by the optional access TTL
///
/// # Examples
///
/// ```
/// use tiercache_core::{CacheEntry, CacheValue};
/// use std::time::{Duration, Instant};
///
/// let now = Instant::now();
/// let entry = CacheEntry::new(CacheValue::Tombstone, now, Some(Duration::from_secs(5)));
/// assert!(!entry.is_expired(now, None));
/// assert!(entry.is_expired(now + Duration::from_secs(5), None));
/// ```
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub value: CacheValue,
    pub inserted_at: Instant,
    pub expires_at: Option<Instant>,
    pub last_access: Instant,
}

impl CacheEntry {
    pub fn new(value: CacheValue, now: Instant, ttl: Option<Duration>) -> Self {
        Self {
            value,
            inserted_at: now,
            expires_at: ttl.map(|ttl| now + ttl),
            last_access: now,
        }
    }

    /// The earliest of the write deadline and the access deadline.
    pub fn deadline(&self, access_ttl: Option<Duration>) -> Option<Instant> {
        let access_deadline = access_ttl.map(|ttl| self.last_access + ttl);
        match (self.expires_at, access_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_expired(&self, now: Instant, access_ttl: Option<Duration>) -> bool {
        self.deadline(access_ttl)
            .map(|deadline| now >= deadline)
            .unwrap_or(false)
    }

    pub fn remaining(&self, now: Instant, access_ttl: Option<Duration>) -> TtlRemaining {
        match self.deadline(access_ttl) {
            None => TtlRemaining::NoExpiry,
            Some(deadline) if now >= deadline => TtlRemaining::Missing,
            Some(deadline) => TtlRemaining::Expires(deadline - now),
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_access = now;
    }
}
