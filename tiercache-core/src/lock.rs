//! Lease-based mutual exclusion on top of the shared key-value service.
//!
//! A lock is a key set with `set_nx` whose value is a per-acquisition
//! token. Only a caller presenting the same token can release or extend it,
//! so a holder whose lease expired can never free the lock of whoever
//! acquired it next.
//!
//! Leases are always finite: a crashed holder blocks others for at most
//! one lease.

use crate::clock::{system_clock, Clock};
use crate::codec::KeyCodec;
use crate::config::LockConfig;
use crate::error::{CacheError, CacheResult};
use crate::remote::RemoteStore;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

static NODE_ID: Lazy<String> =
    Lazy::new(|| format!("{:016x}-{}", fastrand::u64(..), std::process::id()));

/// Identifier of this process in lock tokens.
pub fn node_id() -> &'static str {
    NODE_ID.as_str()
}

/// Lifecycle of a [`LockHandle`].
///
/// `Unlocked -> Acquiring -> Held -> Released`, falling back from
/// `Acquiring` to `Unlocked` when the wait times out or the service fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Acquiring,
    Held,
    Released,
}

/// One acquisition of a named lock. Request-scoped: release it before the
/// critical section ends.
#[derive(Debug)]
pub struct LockHandle {
    lock_key: String,
    token: String,
    lease: Duration,
    lease_expires_at: Option<Instant>,
    state: LockState,
}

impl LockHandle {
    pub fn lock_key(&self) -> &str {
        &self.lock_key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Local estimate of when the lease runs out, by the lock's clock.
    pub fn lease_expires_at(&self) -> Option<Instant> {
        self.lease_expires_at
    }
}

/// Distributed lock service.
///
/// Connectivity loss while a lock is held does not change the handle's
/// state: the lease expires remotely regardless. Code guarded by the lock
/// must treat a failing lock service as "the lock may be lost" and
/// re-validate before any non-idempotent side effect.
///
/// # Examples
///
/// ```
/// use tiercache_core::{DistributedLock, InMemoryRemoteStore, LockConfig, LockState};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let lock = DistributedLock::new(Arc::new(InMemoryRemoteStore::new()), LockConfig::default()).unwrap();
///
/// let mut handle = lock
///     .try_acquire("orders", "order:42", Duration::from_millis(50), None)
///     .unwrap()
///     .expect("uncontended");
/// assert_eq!(handle.state(), LockState::Held);
///
/// // A second caller times out instead of blocking forever.
/// let other = lock
///     .try_acquire("orders", "order:42", Duration::from_millis(20), None)
///     .unwrap();
/// assert!(other.is_none());
///
/// assert!(lock.release(&mut handle).unwrap());
/// assert!(!lock.release(&mut handle).unwrap());
/// ```
pub struct DistributedLock {
    store: Arc<dyn RemoteStore>,
    codec: KeyCodec,
    config: LockConfig,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
}

impl DistributedLock {
    /// Fails with [`CacheError::Configuration`] if `config` is invalid,
    /// e.g. a zero `default_lease`.
    pub fn new(store: Arc<dyn RemoteStore>, config: LockConfig) -> CacheResult<Self> {
        Self::with_clock(store, config, system_clock())
    }

    /// `clock` should be the same time source that drives the store's
    /// expiry, so that [`LockHandle::lease_expires_at`] agrees with it.
    pub fn with_clock(
        store: Arc<dyn RemoteStore>,
        config: LockConfig,
        clock: Arc<dyn Clock>,
    ) -> CacheResult<Self> {
        config.validate()?;
        let codec = KeyCodec::new(config.key_prefix.clone());
        Ok(Self {
            store,
            codec,
            config,
            clock,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    fn handle(&self, namespace: &str, key: &str, lease: Option<Duration>) -> LockHandle {
        let lease = match lease {
            Some(lease) if !lease.is_zero() => lease,
            _ => self.config.default_lease,
        };
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        LockHandle {
            lock_key: self.codec.lock_key(namespace, key),
            token: format!("{}:{}", node_id(), seq),
            lease,
            lease_expires_at: None,
            state: LockState::Unlocked,
        }
    }

    fn attempt(&self, handle: &mut LockHandle) -> CacheResult<bool> {
        handle.state = LockState::Acquiring;
        let acquired = self
            .store
            .set_nx(&handle.lock_key, handle.token.as_bytes(), Some(handle.lease))
            .map_err(|source| {
                handle.state = LockState::Unlocked;
                CacheError::LockAcquisition {
                    key: handle.lock_key.clone(),
                    source,
                }
            })?;
        if acquired {
            handle.state = LockState::Held;
            handle.lease_expires_at = Some(self.clock.now() + handle.lease);
            debug!(lock = %handle.lock_key, lease_ms = handle.lease.as_millis() as u64, "lock acquired");
        }
        Ok(acquired)
    }

    /// Blocks until the lock is acquired. There is no wait limit; use only
    /// for short critical sections, bounded by the lease.
    pub fn acquire(&self, namespace: &str, key: &str, lease: Option<Duration>) -> CacheResult<LockHandle> {
        let mut handle = self.handle(namespace, key, lease);
        loop {
            if self.attempt(&mut handle)? {
                return Ok(handle);
            }
            thread::sleep(self.config.retry_interval);
        }
    }

    /// Tries to acquire the lock for at most `wait`.
    ///
    /// Returns `Ok(None)` on timeout. A failing lock service is an error
    /// ([`CacheError::LockAcquisition`]), never a plain "not acquired".
    pub fn try_acquire(
        &self,
        namespace: &str,
        key: &str,
        wait: Duration,
        lease: Option<Duration>,
    ) -> CacheResult<Option<LockHandle>> {
        let mut handle = self.handle(namespace, key, lease);
        let started = Instant::now();
        loop {
            if self.attempt(&mut handle)? {
                return Ok(Some(handle));
            }
            let waited = started.elapsed();
            if waited >= wait {
                handle.state = LockState::Unlocked;
                debug!(lock = %handle.lock_key, waited_ms = waited.as_millis() as u64, "lock wait timed out");
                return Ok(None);
            }
            thread::sleep(self.config.retry_interval.min(wait - waited));
        }
    }

    /// Releases a held lock. Idempotent.
    ///
    /// Returns `false` when there was nothing to release: the handle is not
    /// held, or its lease already expired (possibly now owned by someone
    /// else, whose lock is left alone).
    pub fn release(&self, handle: &mut LockHandle) -> CacheResult<bool> {
        if handle.state != LockState::Held {
            return Ok(false);
        }
        let released = self
            .store
            .compare_and_delete(&handle.lock_key, handle.token.as_bytes())
            .map_err(|source| CacheError::LockAcquisition {
                key: handle.lock_key.clone(),
                source,
            })?;
        handle.state = LockState::Released;
        if released {
            debug!(lock = %handle.lock_key, "lock released");
        } else {
            warn!(lock = %handle.lock_key, "lease expired before release; lock was not ours anymore");
        }
        Ok(released)
    }

    /// Deletes the lock regardless of holder.
    ///
    /// For administrative recovery only. Under normal operation this can
    /// free a lock that another caller legitimately holds.
    pub fn force_release(&self, namespace: &str, key: &str) -> CacheResult<bool> {
        let lock_key = self.codec.lock_key(namespace, key);
        let removed = self
            .store
            .delete(&lock_key)
            .map_err(|source| CacheError::LockAcquisition {
                key: lock_key.clone(),
                source,
            })?;
        warn!(lock = %lock_key, removed, "lock force-released");
        Ok(removed)
    }

    /// Asks the service whether `handle` still owns its lock.
    pub fn is_held(&self, handle: &LockHandle) -> CacheResult<bool> {
        if handle.state != LockState::Held {
            return Ok(false);
        }
        let current = self
            .store
            .get(&handle.lock_key)
            .map_err(|source| CacheError::LockAcquisition {
                key: handle.lock_key.clone(),
                source,
            })?;
        Ok(current.as_deref() == Some(handle.token.as_bytes()))
    }

    /// Renews the lease of a held lock. Returns `false`, and marks the
    /// handle released, if the lease was already lost.
    pub fn extend(&self, handle: &mut LockHandle, lease: Duration) -> CacheResult<bool> {
        if handle.state != LockState::Held || lease.is_zero() {
            return Ok(false);
        }
        let extended = self
            .store
            .compare_and_expire(&handle.lock_key, handle.token.as_bytes(), lease)
            .map_err(|source| CacheError::LockAcquisition {
                key: handle.lock_key.clone(),
                source,
            })?;
        if extended {
            handle.lease = lease;
            handle.lease_expires_at = Some(self.clock.now() + lease);
        } else {
            handle.state = LockState::Released;
            warn!(lock = %handle.lock_key, "cannot extend a lease that was already lost");
        }
        Ok(extended)
    }

    /// Runs `f` while holding the lock.
    ///
    /// Returns `Ok(None)` without running `f` if the lock could not be
    /// acquired within `wait`. The lock is released whether `f` succeeds or
    /// fails; an error from `f` takes precedence over a release error.
    pub fn with_lock<T>(
        &self,
        namespace: &str,
        key: &str,
        wait: Duration,
        lease: Option<Duration>,
        f: impl FnOnce() -> CacheResult<T>,
    ) -> CacheResult<Option<T>> {
        let mut handle = match self.try_acquire(namespace, key, wait, lease)? {
            Some(handle) => handle,
            None => return Ok(None),
        };
        let result = f();
        let released = self.release(&mut handle);
        let value = result?;
        released?;
        Ok(Some(value))
    }
}
