use crate::cache::{Cache, CacheValue, Expiry};
use crate::codec::{decode_json, encode_json};
use crate::config::{CacheConfig, ProtectionFlags, RemoteFailurePolicy};
use crate::error::CacheResult;
use crate::key::KeyExpressionEvaluator;
use crate::lock::DistributedLock;
use crate::manager::CacheManager;
use crate::protection::StampedeProtection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// What an eviction removes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvictTarget {
    Key(String),
    AllEntries,
}

impl From<&str> for EvictTarget {
    fn from(key: &str) -> Self {
        EvictTarget::Key(key.to_string())
    }
}

impl From<String> for EvictTarget {
    fn from(key: String) -> Self {
        EvictTarget::Key(key)
    }
}

/// Entry point for call sites: read-through, write-through and evict
/// against named caches.
///
/// The coordinator only translates a call into cache operations. Keys are
/// already resolved and values are opaque bytes (or serde types through
/// [`read_as`](Self::read_as) / [`write_as`](Self::write_as)).
///
/// # Protection
///
/// Reads apply the strategies enabled in the cache's
/// [`ProtectionConfig`](crate::ProtectionConfig) unless the caller passes
/// explicit [`ProtectionFlags`]. Writes only ever apply avalanche jitter.
///
/// # Remote failures
///
/// With [`RemoteFailurePolicy::DegradeToLocal`] a read that hits an
/// unreachable remote store is answered by the loader directly, and the
/// loader still runs at most once. A multi-level cache keeps the loaded
/// value in its local tier for `local_ttl`. Writes and evictions always surface
/// [`CacheError::RemoteUnavailable`](crate::CacheError::RemoteUnavailable).
///
/// # Examples
///
/// ```
/// use tiercache_core::{CacheConfig, CacheCoordinator, CacheManager, CacheSettings, TierMode};
/// use std::sync::Arc;
///
/// let manager = Arc::new(CacheManager::new(CacheSettings::new(CacheConfig {
///     mode: TierMode::Local,
///     ..CacheConfig::default()
/// })));
/// let coordinator = CacheCoordinator::new(manager);
///
/// let value = coordinator
///     .read("users", "u:1", || Ok(Some(b"alice".to_vec())), None)
///     .unwrap();
/// assert_eq!(value, Some(b"alice".to_vec()));
///
/// // Served from the cache: this loader is never called.
/// let again = coordinator
///     .read("users", "u:1", || unreachable!(), None)
///     .unwrap();
/// assert_eq!(again, value);
/// ```
pub struct CacheCoordinator {
    manager: Arc<CacheManager>,
    lock: Option<Arc<DistributedLock>>,
}

impl CacheCoordinator {
    pub fn new(manager: Arc<CacheManager>) -> Self {
        Self {
            manager,
            lock: None,
        }
    }

    /// Lock used by breakdown protection.
    pub fn with_lock(mut self, lock: Arc<DistributedLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    fn resolve(&self, cache_name: &str) -> CacheResult<(Arc<dyn Cache>, Arc<CacheConfig>)> {
        self.manager.get_cache_with_config(cache_name)
    }

    /// Returns the cached value of `key`, loading and caching it on a miss.
    ///
    /// `flags` overrides the cache's configured protection for this call.
    pub fn read<F>(
        &self,
        cache_name: &str,
        key: &str,
        mut loader: F,
        flags: Option<ProtectionFlags>,
    ) -> CacheResult<Option<Vec<u8>>>
    where
        F: FnMut() -> CacheResult<Option<Vec<u8>>>,
    {
        let (cache, config) = self.resolve(cache_name)?;
        let flags = flags.unwrap_or_else(|| config.protection.flags());
        let protection =
            StampedeProtection::new(&config.protection, flags, self.lock.clone(), cache_name)?;

        let mut loaded: Option<Option<Vec<u8>>> = None;
        let result = protection.get_or_load(cache.as_ref(), key, &mut || {
            let value = loader()?;
            loaded = Some(value.clone());
            Ok(value)
        });

        match result {
            Err(e)
                if e.is_remote_unavailable()
                    && config.remote_failure == RemoteFailurePolicy::DegradeToLocal =>
            {
                warn!(cache = cache_name, key, error = %e, "remote tier unavailable; answering from loader");
                let value = match loaded {
                    Some(value) => value,
                    None => loader()?,
                };
                if let (Some(local), Some(bytes)) = (cache.local_tier(), &value) {
                    let ttl = match config.local_ttl {
                        Some(ttl) => Expiry::After(ttl),
                        None => Expiry::Default,
                    };
                    local.put(key, CacheValue::Present(bytes.clone()), ttl)?;
                }
                Ok(value)
            }
            other => other,
        }
    }

    /// [`read`](Self::read) for serde types, stored as JSON.
    pub fn read_as<T, F>(
        &self,
        cache_name: &str,
        key: &str,
        mut loader: F,
        flags: Option<ProtectionFlags>,
    ) -> CacheResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> CacheResult<Option<T>>,
    {
        let bytes = self.read(
            cache_name,
            key,
            || loader()?.map(|value| encode_json(key, &value)).transpose(),
            flags,
        )?;
        bytes.map(|bytes| decode_json(key, &bytes)).transpose()
    }

    /// Unconditionally caches `value`. Only avalanche jitter applies.
    pub fn write(&self, cache_name: &str, key: &str, value: Vec<u8>, ttl: Expiry) -> CacheResult<()> {
        let (cache, config) = self.resolve(cache_name)?;
        let protection = StampedeProtection::for_writes(&config.protection, config.protection.flags());
        protection.put(cache.as_ref(), key, CacheValue::Present(value), ttl)
    }

    /// [`write`](Self::write) for serde types, stored as JSON.
    pub fn write_as<T: Serialize + ?Sized>(
        &self,
        cache_name: &str,
        key: &str,
        value: &T,
        ttl: Expiry,
    ) -> CacheResult<()> {
        let bytes = encode_json(key, value)?;
        self.write(cache_name, key, bytes, ttl)
    }

    pub fn evict(&self, cache_name: &str, target: impl Into<EvictTarget>) -> CacheResult<()> {
        let cache = self.manager.get_cache(cache_name)?;
        match target.into() {
            EvictTarget::Key(key) => cache.evict(&key),
            EvictTarget::AllEntries => cache.evict_all(),
        }
    }

    /// Conditional read-through.
    ///
    /// The key comes from `evaluator`. When `condition` evaluates to false
    /// the cache is bypassed and the loader is called directly. When
    /// `unless` evaluates to true for a freshly loaded result, that result
    /// is returned but not kept. Values already cached are returned as-is.
    #[allow(clippy::too_many_arguments)]
    pub fn read_when<Ctx, E, F>(
        &self,
        evaluator: &E,
        context: &Ctx,
        cache_name: &str,
        condition: Option<&str>,
        unless: Option<&str>,
        mut loader: F,
        flags: Option<ProtectionFlags>,
    ) -> CacheResult<Option<Vec<u8>>>
    where
        Ctx: ?Sized,
        E: KeyExpressionEvaluator<Ctx> + ?Sized,
        F: FnMut() -> CacheResult<Option<Vec<u8>>>,
    {
        if let Some(expr) = condition {
            if !evaluator.evaluate_condition(expr, context) {
                return loader();
            }
        }

        let key = evaluator.resolve_key(context)?;
        let mut fresh = false;
        let result = self.read(
            cache_name,
            key.as_str(),
            || {
                fresh = true;
                loader()
            },
            flags,
        )?;

        if let Some(expr) = unless {
            if fresh && evaluator.evaluate_unless(expr, context, result.as_deref()) {
                self.discard(cache_name, key.as_str())?;
            }
        }
        Ok(result)
    }

    fn discard(&self, cache_name: &str, key: &str) -> CacheResult<()> {
        match self.evict(cache_name, key) {
            Err(e)
                if e.is_remote_unavailable()
                    && self.manager.config_for(cache_name).remote_failure
                        == RemoteFailurePolicy::DegradeToLocal =>
            {
                // The local copy goes before the remote eviction is tried.
                Ok(())
            }
            other => other,
        }
    }
}
