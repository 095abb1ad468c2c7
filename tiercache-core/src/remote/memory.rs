use super::RemoteStore;
use crate::cache::TtlRemaining;
use crate::clock::{system_clock, Clock};
use crate::error::{RemoteError, RemoteResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-command call counters of an [`InMemoryRemoteStore`].
#[derive(Debug, Default)]
pub struct StoreCounters {
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    lock_ops: AtomicU64,
}

impl StoreCounters {
    /// `get` and `mget` calls (one per key).
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// `set` and `set_nx` calls.
    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Compare-and-delete / compare-and-expire calls.
    pub fn lock_ops(&self) -> u64 {
        self.lock_ops.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.gets.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.lock_ops.store(0, Ordering::Relaxed);
    }
}

#[derive(Clone, Debug)]
struct StoredEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn new(value: &[u8], now: Instant, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_vec(),
            expires_at: ttl.map(|ttl| now + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now < at).unwrap_or(true)
    }
}

/// A process-local stand-in for the shared key-value service.
///
/// Behaves like the real service for the engine's purposes: lazy TTL
/// expiry driven by the injected clock, atomic `set_nx` and
/// compare-and-delete. Two extras make it useful in tests:
///
/// - [`counters`](Self::counters) count calls per command, so tests can
///   assert that a read was served without a remote round-trip;
/// - [`set_available`](Self::set_available) simulates an outage, making
///   every command fail with [`RemoteError::Connection`].
///
/// Clone the surrounding `Arc` to share one store between several
/// "processes" (caches, managers, locks) in a test.
#[derive(Debug)]
pub struct InMemoryRemoteStore {
    entries: DashMap<String, StoredEntry>,
    clock: Arc<dyn Clock>,
    counters: StoreCounters,
    available: AtomicBool,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            counters: StoreCounters::default(),
            available: AtomicBool::new(true),
        }
    }

    pub fn counters(&self) -> &StoreCounters {
        &self.counters
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> RemoteResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Connection(
                "in-memory store marked unavailable".to_string(),
            ))
        }
    }

    fn live_value(&self, key: &str, now: Instant) -> Option<Vec<u8>> {
        let (value, expired) = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => (Some(entry.value.clone()), false),
            Some(_) => (None, true),
            None => (None, false),
        };
        if expired {
            self.entries.remove_if(key, |_, e| !e.is_live(now));
        }
        value
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for InMemoryRemoteStore {
    fn get(&self, key: &str) -> RemoteResult<Option<Vec<u8>>> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        self.check()?;
        Ok(self.live_value(key, self.clock.now()))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> RemoteResult<()> {
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        self.check()?;
        let now = self.clock.now();
        self.entries
            .insert(key.to_string(), StoredEntry::new(value, now, ttl));
        Ok(())
    }

    fn set_nx(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> RemoteResult<bool> {
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        self.check()?;
        let now = self.clock.now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    Ok(false)
                } else {
                    occupied.insert(StoredEntry::new(value, now, ttl));
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry::new(value, now, ttl));
                Ok(true)
            }
        }
    }

    fn delete(&self, key: &str) -> RemoteResult<bool> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        self.check()?;
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, e)| e.is_live(now))
            .unwrap_or(false))
    }

    fn delete_prefix(&self, prefix: &str) -> RemoteResult<u64> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        self.check()?;
        let now = self.clock.now();
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(&key) {
                if entry.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn exists(&self, key: &str) -> RemoteResult<bool> {
        self.check()?;
        Ok(self.live_value(key, self.clock.now()).is_some())
    }

    fn ttl(&self, key: &str) -> RemoteResult<TtlRemaining> {
        self.check()?;
        let now = self.clock.now();
        Ok(match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => match entry.expires_at {
                Some(at) => TtlRemaining::Expires(at - now),
                None => TtlRemaining::NoExpiry,
            },
            _ => TtlRemaining::Missing,
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> RemoteResult<bool> {
        self.check()?;
        let now = self.clock.now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn persist(&self, key: &str) -> RemoteResult<bool> {
        self.check()?;
        let now = self.clock.now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn count_prefix(&self, prefix: &str) -> RemoteResult<u64> {
        self.check()?;
        let now = self.clock.now();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().is_live(now))
            .count() as u64)
    }

    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> RemoteResult<bool> {
        self.counters.lock_ops.fetch_add(1, Ordering::Relaxed);
        self.check()?;
        let now = self.clock.now();
        Ok(self
            .entries
            .remove_if(key, |_, e| e.is_live(now) && e.value == expected)
            .is_some())
    }

    fn compare_and_expire(&self, key: &str, expected: &[u8], ttl: Duration) -> RemoteResult<bool> {
        self.counters.lock_ops.fetch_add(1, Ordering::Relaxed);
        self.check()?;
        let now = self.clock.now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) && entry.value == expected => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
