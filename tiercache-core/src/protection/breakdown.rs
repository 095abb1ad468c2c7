use super::Probe;
use crate::cache::Cache;
use crate::config::LockTimeoutPolicy;
use crate::error::{CacheError, CacheResult};
use crate::lock::DistributedLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Serializes recomputation of one hot key behind a per-key distributed
/// lock.
///
/// The lock only bounds latency: callers holding it serialize among
/// themselves while the lease lasts, which is not a global at-most-once
/// guarantee.
pub struct Breakdown {
    lock: Arc<DistributedLock>,
    wait: Duration,
    lease: Duration,
    policy: LockTimeoutPolicy,
}

impl Breakdown {
    pub fn new(
        lock: Arc<DistributedLock>,
        wait: Duration,
        lease: Duration,
        policy: LockTimeoutPolicy,
    ) -> Self {
        Self {
            lock,
            wait,
            lease,
            policy,
        }
    }

    pub fn policy(&self) -> &LockTimeoutPolicy {
        &self.policy
    }

    /// Loads `key` after a cache miss.
    ///
    /// `probe` re-reads the cache and `load` invokes the loader and stores
    /// its result. With the lock held, the cache is re-read first, since a
    /// previous holder has usually filled it. On lock timeout the cache is
    /// re-read once, then the [`LockTimeoutPolicy`] decides.
    pub(crate) fn load<P, L>(
        &self,
        cache: &dyn Cache,
        key: &str,
        mut probe: P,
        mut load: L,
    ) -> CacheResult<Option<Vec<u8>>>
    where
        P: FnMut() -> CacheResult<Probe>,
        L: FnMut() -> CacheResult<Option<Vec<u8>>>,
    {
        match self
            .lock
            .try_acquire(cache.name(), key, self.wait, Some(self.lease))?
        {
            Some(mut handle) => {
                let result = match probe() {
                    Ok(Probe::Hit(value)) => {
                        debug!(cache = %cache.name(), key, "filled by previous lock holder");
                        Ok(value)
                    }
                    Ok(Probe::Miss) => load(),
                    Err(e) => Err(e),
                };
                // The lease bounds a lock we failed to release.
                if let Err(e) = self.lock.release(&mut handle) {
                    warn!(cache = %cache.name(), key, error = %e, "failed to release breakdown lock");
                }
                result
            }
            None => {
                cache.stats().record_lock_timeout();
                warn!(
                    cache = %cache.name(),
                    key,
                    waited_ms = self.wait.as_millis() as u64,
                    "breakdown lock wait timed out"
                );
                if let Probe::Hit(value) = probe()? {
                    return Ok(value);
                }
                match &self.policy {
                    LockTimeoutPolicy::LoadWithoutLock => load(),
                    LockTimeoutPolicy::Fallback(value) => Ok(value.clone()),
                    LockTimeoutPolicy::Fail => Err(CacheError::LockTimeout {
                        key: key.to_string(),
                        waited: self.wait,
                    }),
                }
            }
        }
    }
}
