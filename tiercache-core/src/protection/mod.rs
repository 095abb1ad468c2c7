//! Stampede protection: three independent strategies wrapped around
//! [`Cache::get_or_load`] and [`Cache::put`].
//!
//! - [`Penetration`] caches "not found" as a short-lived tombstone.
//! - [`Breakdown`] lets one caller per key recompute an expired value while
//!   the others wait for it.
//! - [`Avalanche`] jitters TTLs so entries written together do not expire
//!   together.
//!
//! Each is switched on per cache through
//! [`ProtectionConfig`](crate::ProtectionConfig), or per call through
//! [`ProtectionFlags`](crate::ProtectionFlags).

mod avalanche;
mod breakdown;
mod penetration;

pub use avalanche::Avalanche;
pub use breakdown::Breakdown;
pub use penetration::Penetration;

use crate::cache::{Cache, CacheValue, Expiry, Loader};
use crate::config::{ProtectionConfig, ProtectionFlags};
use crate::error::{CacheError, CacheResult};
use crate::lock::DistributedLock;
use std::sync::Arc;
use tracing::debug;

/// Result of re-reading the cache: a hit (`None` = tombstone) or a miss.
#[derive(Debug)]
pub(crate) enum Probe {
    Hit(Option<Vec<u8>>),
    Miss,
}

/// The strategies enabled for one call.
#[derive(Default)]
pub struct StampedeProtection {
    penetration: Option<Penetration>,
    breakdown: Option<Breakdown>,
    avalanche: Option<Avalanche>,
}

impl StampedeProtection {
    /// No strategy: behaves like plain [`Cache::get_or_load`].
    pub fn none() -> Self {
        Self::default()
    }

    /// Builds the strategies selected by `flags`, parameterized by `config`.
    ///
    /// Breakdown needs a `lock` and an explicit lock-timeout policy; without
    /// them this fails with [`CacheError::Configuration`].
    pub fn new(
        config: &ProtectionConfig,
        flags: ProtectionFlags,
        lock: Option<Arc<DistributedLock>>,
        cache: &str,
    ) -> CacheResult<Self> {
        let penetration = if flags.penetration {
            if config.penetration_tombstone_ttl.is_zero() {
                return Err(CacheError::configuration(
                    cache,
                    "penetration_tombstone_ttl must be greater than zero",
                ));
            }
            Some(Penetration::new(config.penetration_tombstone_ttl))
        } else {
            None
        };

        let breakdown = if flags.breakdown {
            config.validate_breakdown(cache)?;
            let lock = lock.ok_or_else(|| {
                CacheError::configuration(cache, "breakdown protection requires a distributed lock")
            })?;
            let policy = config.lock_timeout_policy.clone().ok_or_else(|| {
                CacheError::configuration(
                    cache,
                    "breakdown protection requires an explicit lock_timeout_policy",
                )
            })?;
            Some(Breakdown::new(
                lock,
                config.breakdown_lock_wait_timeout,
                config.breakdown_lock_lease,
                policy,
            ))
        } else {
            None
        };

        let avalanche = if flags.avalanche {
            Some(Avalanche::new(config.avalanche_jitter_percent))
        } else {
            None
        };

        Ok(Self {
            penetration,
            breakdown,
            avalanche,
        })
    }

    /// The strategies that apply to unconditional writes: avalanche only.
    pub fn for_writes(config: &ProtectionConfig, flags: ProtectionFlags) -> Self {
        Self {
            avalanche: flags
                .avalanche
                .then(|| Avalanche::new(config.avalanche_jitter_percent)),
            ..Self::default()
        }
    }

    pub fn flags(&self) -> ProtectionFlags {
        ProtectionFlags {
            penetration: self.penetration.is_some(),
            breakdown: self.breakdown.is_some(),
            avalanche: self.avalanche.is_some(),
        }
    }

    /// Reads `key` through `cache`, loading it on a miss.
    ///
    /// A tombstone hit resolves to `None` without calling the loader. The
    /// loader runs at most once per call.
    pub fn get_or_load(
        &self,
        cache: &dyn Cache,
        key: &str,
        loader: &mut Loader<'_>,
    ) -> CacheResult<Option<Vec<u8>>> {
        if let Probe::Hit(value) = probe(cache, key)? {
            return Ok(value);
        }
        match &self.breakdown {
            Some(breakdown) => breakdown.load(
                cache,
                key,
                || probe(cache, key),
                || self.load_and_store(cache, key, &mut *loader),
            ),
            None => self.load_and_store(cache, key, loader),
        }
    }

    /// Writes through `cache`, jittering the TTL when avalanche protection
    /// is on.
    pub fn put(&self, cache: &dyn Cache, key: &str, value: CacheValue, ttl: Expiry) -> CacheResult<()> {
        let ttl = match &self.avalanche {
            Some(avalanche) => avalanche.apply(ttl, cache.default_ttl()),
            None => ttl,
        };
        cache.put(key, value, ttl)
    }

    fn load_and_store(
        &self,
        cache: &dyn Cache,
        key: &str,
        loader: &mut Loader<'_>,
    ) -> CacheResult<Option<Vec<u8>>> {
        cache.stats().record_load();
        let loaded = loader()?;
        match &loaded {
            Some(bytes) => self.put(cache, key, CacheValue::Present(bytes.clone()), Expiry::Default)?,
            None => {
                if let Some(penetration) = &self.penetration {
                    penetration.record_absent(cache, key)?;
                }
            }
        }
        Ok(loaded)
    }
}

fn probe(cache: &dyn Cache, key: &str) -> CacheResult<Probe> {
    Ok(match cache.get(key)? {
        Some(CacheValue::Present(bytes)) => Probe::Hit(Some(bytes)),
        Some(CacheValue::Tombstone) => {
            cache.stats().record_tombstone_hit();
            debug!(cache = %cache.name(), key, "tombstone hit");
            Probe::Hit(None)
        }
        None => Probe::Miss,
    })
}
