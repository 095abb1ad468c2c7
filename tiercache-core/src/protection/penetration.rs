use crate::cache::{Cache, CacheValue, Expiry};
use crate::error::CacheResult;
use std::time::Duration;
use tracing::debug;

/// Caches "not found" results as tombstones so repeated lookups of a
/// missing key stop reaching the loader.
///
/// Keep the tombstone TTL short: a record created upstream afterwards stays
/// invisible until the tombstone expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Penetration {
    tombstone_ttl: Duration,
}

impl Penetration {
    pub fn new(tombstone_ttl: Duration) -> Self {
        Self { tombstone_ttl }
    }

    pub fn tombstone_ttl(&self) -> Duration {
        self.tombstone_ttl
    }

    /// Writes a tombstone for `key`.
    pub fn record_absent(&self, cache: &dyn Cache, key: &str) -> CacheResult<()> {
        cache.put(key, CacheValue::Tombstone, Expiry::After(self.tombstone_ttl))?;
        debug!(
            cache = %cache.name(),
            key,
            ttl_ms = self.tombstone_ttl.as_millis() as u64,
            "tombstone written"
        );
        Ok(())
    }
}
