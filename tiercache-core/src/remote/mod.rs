//! Clients for the shared key-value service.
//!
//! The engine only needs the small command set below; the wire protocol is
//! the backend's business. [`InMemoryRemoteStore`] simulates the service in
//! process, and the `redis` feature adds a real Redis backend.

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::{InMemoryRemoteStore, StoreCounters};
#[cfg(feature = "redis")]
pub use redis_store::{RedisStore, RedisStoreConfig};

use crate::cache::TtlRemaining;
use crate::error::RemoteResult;
use std::time::Duration;

/// Commands of the shared key-value service.
///
/// Every call is bounded by the backend's own timeout and reports failures
/// as [`RemoteError`](crate::RemoteError). TTLs are millisecond precision;
/// `None` means no expiry.
pub trait RemoteStore: Send + Sync {
    fn get(&self, key: &str) -> RemoteResult<Option<Vec<u8>>>;

    fn mget(&self, keys: &[String]) -> RemoteResult<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|k| self.get(k)).collect()
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> RemoteResult<()>;

    /// Sets the key only if it does not exist. Returns whether it was set.
    fn set_nx(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> RemoteResult<bool>;

    fn delete(&self, key: &str) -> RemoteResult<bool>;

    /// Deletes every key starting with `prefix`; returns how many.
    fn delete_prefix(&self, prefix: &str) -> RemoteResult<u64>;

    fn exists(&self, key: &str) -> RemoteResult<bool>;

    fn ttl(&self, key: &str) -> RemoteResult<TtlRemaining>;

    /// Resets the expiry of an existing key. Returns `false` if it is missing.
    fn expire(&self, key: &str, ttl: Duration) -> RemoteResult<bool>;

    /// Removes the expiry of an existing key. Returns `false` if it is missing.
    fn persist(&self, key: &str) -> RemoteResult<bool>;

    fn count_prefix(&self, prefix: &str) -> RemoteResult<u64>;

    /// Atomically deletes `key` if its value equals `expected`.
    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> RemoteResult<bool>;

    /// Atomically resets the expiry of `key` if its value equals `expected`.
    fn compare_and_expire(&self, key: &str, expected: &[u8], ttl: Duration) -> RemoteResult<bool>;
}
