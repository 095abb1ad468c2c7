use crate::cache::Cache;
use crate::clock::{system_clock, Clock};
use crate::codec::{validate_cache_name, KeyCodec};
use crate::config::{CacheConfig, CacheSettings, TierMode};
use crate::error::{CacheError, CacheResult};
use crate::local_cache::{LocalCache, LocalCacheConfig};
use crate::multi_level::MultiLevelCache;
use crate::remote::RemoteStore;
use crate::remote_cache::RemoteCache;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct ManagedCache {
    cache: Arc<dyn Cache>,
    config: Arc<CacheConfig>,
}

/// Registry of named caches.
///
/// Caches are created on first lookup from [`CacheSettings`] and live as
/// long as the manager. The manager is a plain value: construct one per
/// application (or per test) and pass it where it is needed.
///
/// # Examples
///
/// ```
/// use tiercache_core::{Cache, CacheConfig, CacheManager, CacheSettings, TierMode};
///
/// let manager = CacheManager::new(CacheSettings::new(CacheConfig {
///     mode: TierMode::Local,
///     ..CacheConfig::default()
/// }));
///
/// let users = manager.get_cache("users").unwrap();
/// assert_eq!(users.name(), "users");
/// assert!(std::sync::Arc::ptr_eq(&users, &manager.get_cache("users").unwrap()));
/// ```
pub struct CacheManager {
    caches: DashMap<String, ManagedCache>,
    settings: CacheSettings,
    store: Option<Arc<dyn RemoteStore>>,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    /// A manager without a remote store: only [`TierMode::Local`] caches
    /// can be created.
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            caches: DashMap::new(),
            settings,
            store: None,
            clock: system_clock(),
        }
    }

    pub fn with_remote(settings: CacheSettings, store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new(settings)
        }
    }

    /// Replaces the time source of caches created from now on.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn store(&self) -> Option<&Arc<dyn RemoteStore>> {
        self.store.as_ref()
    }

    /// Returns the cache called `name`, creating it on first use.
    ///
    /// Creation validates the resolved configuration; an invalid one fails
    /// here with [`CacheError::Configuration`] and no cache is registered.
    pub fn get_cache(&self, name: &str) -> CacheResult<Arc<dyn Cache>> {
        self.managed(name).map(|managed| managed.cache)
    }

    /// [`get_cache`](Self::get_cache) together with the configuration the
    /// cache was built with.
    pub fn get_cache_with_config(&self, name: &str) -> CacheResult<(Arc<dyn Cache>, Arc<CacheConfig>)> {
        self.managed(name).map(|managed| (managed.cache, managed.config))
    }

    fn managed(&self, name: &str) -> CacheResult<ManagedCache> {
        if let Some(managed) = self.caches.get(name) {
            return Ok(managed.clone());
        }

        let config = self.settings.resolve(name);
        config.validate(name)?;
        let cache = self.build(name, &config)?;

        match self.caches.entry(name.to_string()) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                info!(cache = name, mode = ?config.mode, "cache created");
                let managed = slot.insert(ManagedCache {
                    cache,
                    config: Arc::new(config),
                });
                Ok(managed.clone())
            }
        }
    }

    /// Registers a cache built by the caller, replacing any cache with the
    /// same name. It is read and written with the configuration resolved
    /// for `name`.
    pub fn register(&self, name: &str, cache: Arc<dyn Cache>) -> CacheResult<Option<Arc<dyn Cache>>> {
        let config = self.settings.resolve(name);
        validate_cache_name(name, &config.key_prefix)?;
        config.protection.validate(name)?;
        info!(cache = name, "cache registered");
        Ok(self
            .caches
            .insert(
                name.to_string(),
                ManagedCache {
                    cache,
                    config: Arc::new(config),
                },
            )
            .map(|previous| previous.cache))
    }

    /// Clears every entry of the cache, including its remote entries, and
    /// drops it from the registry. The next lookup builds a new one.
    ///
    /// Returns `Ok(false)` if no cache with that name exists. If clearing
    /// fails the cache stays registered.
    pub fn destroy_cache(&self, name: &str) -> CacheResult<bool> {
        let cache = match self.caches.get(name) {
            Some(managed) => managed.cache.clone(),
            None => return Ok(false),
        };
        cache.evict_all()?;
        self.caches.remove(name);
        info!(cache = name, "cache destroyed");
        Ok(true)
    }

    /// Names of the caches created so far, sorted.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Configuration of `name`: the one a live cache was built with, or the
    /// one it would be built with.
    pub fn config_for(&self, name: &str) -> Arc<CacheConfig> {
        match self.caches.get(name) {
            Some(managed) => managed.config.clone(),
            None => Arc::new(self.settings.resolve(name)),
        }
    }

    fn build(&self, name: &str, config: &CacheConfig) -> CacheResult<Arc<dyn Cache>> {
        Ok(match config.mode {
            TierMode::Local => Arc::new(self.local_tier(name, config, config.default_ttl)),
            TierMode::Remote => Arc::new(self.remote_tier(name, config)?),
            TierMode::MultiLevel => {
                let local = self.local_tier(name, config, config.local_ttl);
                let remote = self.remote_tier(name, config)?;
                Arc::new(MultiLevelCache::new(local, remote, config.local_ttl)?)
            }
        })
    }

    fn local_tier(
        &self,
        name: &str,
        config: &CacheConfig,
        default_ttl: Option<std::time::Duration>,
    ) -> LocalCache {
        LocalCache::new(
            name,
            LocalCacheConfig {
                max_entries: config.local_max_entries,
                default_ttl,
                access_ttl: config.local_access_ttl,
            },
            self.clock.clone(),
        )
    }

    fn remote_tier(&self, name: &str, config: &CacheConfig) -> CacheResult<RemoteCache> {
        let store = self.store.clone().ok_or_else(|| {
            CacheError::configuration(
                name,
                format!("{:?} mode requires a remote store", config.mode),
            )
        })?;
        Ok(RemoteCache::new(
            name,
            store,
            KeyCodec::new(config.key_prefix.clone()),
            config.default_ttl,
        ))
    }
}
