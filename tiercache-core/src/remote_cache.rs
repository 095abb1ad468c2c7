use crate::cache::{Cache, CacheValue, Expiry, TtlRemaining};
use crate::codec::{BinarySerializer, KeyCodec, ValueSerializer};
use crate::error::{CacheError, CacheResult};
use crate::remote::RemoteStore;
use crate::stats::CacheStats;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Cache tier stored in the shared key-value service.
///
/// Keys are namespaced by [`KeyCodec`] so several caches can share one
/// store; values go through a [`ValueSerializer`] ([`BinarySerializer`]
/// unless replaced). Store failures are reported as
/// [`CacheError::RemoteUnavailable`] and never read as a miss.
pub struct RemoteCache {
    name: String,
    store: Arc<dyn RemoteStore>,
    codec: KeyCodec,
    serializer: Box<dyn ValueSerializer>,
    default_ttl: Option<Duration>,
    stats: CacheStats,
}

impl RemoteCache {
    pub fn new(
        name: &str,
        store: Arc<dyn RemoteStore>,
        codec: KeyCodec,
        default_ttl: Option<Duration>,
    ) -> Self {
        Self {
            name: name.to_string(),
            store,
            codec,
            serializer: Box::new(BinarySerializer),
            default_ttl,
            stats: CacheStats::new(),
        }
    }

    pub fn with_serializer(mut self, serializer: Box<dyn ValueSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    fn remote_key(&self, key: &str) -> String {
        self.codec.encode(&self.name, key)
    }
}

impl Cache for RemoteCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        let raw = self
            .store
            .get(&self.remote_key(key))
            .map_err(|e| CacheError::remote("get", e))?;
        match raw {
            Some(raw) => {
                let value = self.serializer.decode(key, &raw)?;
                self.stats.record_hit();
                Ok(Some(value))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    fn put(&self, key: &str, value: CacheValue, ttl: Expiry) -> CacheResult<()> {
        let raw = self.serializer.encode(key, &value)?;
        let ttl = ttl.resolve(self.default_ttl);
        self.store
            .set(&self.remote_key(key), &raw, ttl)
            .map_err(|e| CacheError::remote("put", e))?;
        debug!(cache = %self.name, key, ttl_ms = ?ttl.map(|t| t.as_millis()), "remote write");
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: CacheValue, ttl: Expiry) -> CacheResult<bool> {
        let raw = self.serializer.encode(key, &value)?;
        self.store
            .set_nx(&self.remote_key(key), &raw, ttl.resolve(self.default_ttl))
            .map_err(|e| CacheError::remote("put_if_absent", e))
    }

    fn evict(&self, key: &str) -> CacheResult<()> {
        self.store
            .delete(&self.remote_key(key))
            .map_err(|e| CacheError::remote("evict", e))?;
        Ok(())
    }

    fn evict_all(&self) -> CacheResult<()> {
        let removed = self
            .store
            .delete_prefix(&self.codec.cache_prefix(&self.name))
            .map_err(|e| CacheError::remote("evict_all", e))?;
        debug!(cache = %self.name, removed, "remote tier cleared");
        Ok(())
    }

    fn ttl_remaining(&self, key: &str) -> CacheResult<TtlRemaining> {
        self.store
            .ttl(&self.remote_key(key))
            .map_err(|e| CacheError::remote("ttl_remaining", e))
    }

    fn touch_ttl(&self, key: &str, ttl: Expiry) -> CacheResult<bool> {
        let remote_key = self.remote_key(key);
        let result = match ttl.resolve(self.default_ttl) {
            Some(ttl) => self.store.expire(&remote_key, ttl),
            None => self.store.persist(&remote_key),
        };
        result.map_err(|e| CacheError::remote("touch_ttl", e))
    }

    fn contains_key(&self, key: &str) -> CacheResult<bool> {
        self.store
            .exists(&self.remote_key(key))
            .map_err(|e| CacheError::remote("contains_key", e))
    }

    fn size(&self) -> CacheResult<u64> {
        self.store
            .count_prefix(&self.codec.cache_prefix(&self.name))
            .map_err(|e| CacheError::remote("size", e))
    }

    fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn multi_get(&self, keys: &[&str]) -> CacheResult<HashMap<String, CacheValue>> {
        let remote_keys: Vec<String> = keys.iter().map(|k| self.remote_key(k)).collect();
        let raws = self
            .store
            .mget(&remote_keys)
            .map_err(|e| CacheError::remote("multi_get", e))?;

        let mut found = HashMap::with_capacity(keys.len());
        for (key, raw) in keys.iter().zip(raws) {
            match raw {
                Some(raw) => {
                    found.insert(key.to_string(), self.serializer.decode(key, &raw)?);
                    self.stats.record_hit();
                }
                None => self.stats.record_miss(),
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::codec::TextSerializer;
    use crate::remote::InMemoryRemoteStore;

    fn remote(store: Arc<InMemoryRemoteStore>) -> RemoteCache {
        RemoteCache::new(
            "orders",
            store,
            KeyCodec::new("app:"),
            Some(Duration::from_secs(60)),
        )
    }

    #[test]
    fn test_values_are_namespaced() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let cache = remote(store.clone());
        cache
            .put("order:1", CacheValue::from(b"one".to_vec()), Expiry::Default)
            .unwrap();

        assert!(store.exists("app:orders::order:1").unwrap());
        assert_eq!(
            cache.get("order:1").unwrap(),
            Some(CacheValue::from(b"one".to_vec()))
        );
    }

    #[test]
    fn test_ttl_remaining_distinguishes_missing_and_no_expiry() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
        let cache = remote(store);

        assert_eq!(cache.ttl_remaining("nope").unwrap(), TtlRemaining::Missing);

        cache
            .put("forever", CacheValue::from(b"x".to_vec()), Expiry::Never)
            .unwrap();
        assert_eq!(cache.ttl_remaining("forever").unwrap(), TtlRemaining::NoExpiry);

        cache
            .put("short", CacheValue::from(b"x".to_vec()), Expiry::Default)
            .unwrap();
        clock.advance(Duration::from_secs(15));
        assert_eq!(
            cache.ttl_remaining("short").unwrap(),
            TtlRemaining::Expires(Duration::from_secs(45))
        );
    }

    #[test]
    fn test_outage_surfaces_remote_unavailable() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let cache = remote(store.clone());
        store.set_available(false);

        let err = cache.get("order:1").unwrap_err();
        assert!(err.is_remote_unavailable());
        assert!(cache.evict("order:1").unwrap_err().is_remote_unavailable());
    }

    #[test]
    fn test_corrupt_remote_value_is_not_a_miss() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let cache = remote(store.clone());
        store.set("app:orders::bad", &[0x42, 0x42], None).unwrap();

        let err = cache.get("bad").unwrap_err();
        assert!(matches!(err, CacheError::Serialization { .. }));
    }

    #[test]
    fn test_evict_all_only_touches_own_namespace() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let orders = remote(store.clone());
        let users = RemoteCache::new("users", store.clone(), KeyCodec::new("app:"), None);

        orders
            .put("1", CacheValue::from(b"o".to_vec()), Expiry::Default)
            .unwrap();
        orders
            .put("2", CacheValue::Tombstone, Expiry::Default)
            .unwrap();
        users
            .put("1", CacheValue::from(b"u".to_vec()), Expiry::Default)
            .unwrap();
        assert_eq!(orders.size().unwrap(), 2);

        orders.evict_all().unwrap();
        assert_eq!(orders.size().unwrap(), 0);
        assert_eq!(users.size().unwrap(), 1);
    }

    #[test]
    fn test_touch_ttl_never_persists() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
        let cache = remote(store);
        cache
            .put("k", CacheValue::from(b"v".to_vec()), Expiry::Default)
            .unwrap();

        assert!(cache.touch_ttl("k", Expiry::Never).unwrap());
        assert_eq!(cache.ttl_remaining("k").unwrap(), TtlRemaining::NoExpiry);
        assert!(!cache.touch_ttl("missing", Expiry::Default).unwrap());
    }

    #[test]
    fn test_multi_get_with_text_serializer() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let cache = remote(store).with_serializer(Box::new(TextSerializer));
        cache
            .multi_put(
                vec![
                    ("a".to_string(), CacheValue::from(b"1".to_vec())),
                    ("b".to_string(), CacheValue::Tombstone),
                ],
                Expiry::Default,
            )
            .unwrap();

        let found = cache.multi_get(&["a", "b", "c"]).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], CacheValue::Tombstone);
        assert_eq!(cache.stats().misses(), 1);
    }
}
