//! # Tiercache Core
//!
//! Engine of the tiercache library: named caches backed by an in-process
//! tier, a shared remote tier, or both, plus the coordination needed to
//! keep them from stampeding the system behind them.
//!
//! ## Features
//!
//! - **Three tiers**: [`LocalCache`] (bounded LRU with TTLs),
//!   [`RemoteCache`] (shared key-value store) and [`MultiLevelCache`]
//!   (local in front of remote, with promotion on read)
//! - **Stampede protection**: tombstones for missing keys, a per-key
//!   distributed lock for hot keys, and TTL jitter against mass expiry
//! - **Distributed lock**: lease-based, token-checked release
//! - **Explicit wiring**: [`CacheManager`] and [`CacheCoordinator`] are plain
//!   values, never globals
//! - **Deterministic time**: every expiry decision goes through a [`Clock`]
//!
//! ## Module Organization
//!
//! - [`cache`] - The [`Cache`] contract, values and expiry types
//! - `local_cache`, `remote_cache`, `multi_level` - The three tiers
//! - [`remote`] - Remote store clients (in-memory, Redis behind the `redis` feature)
//! - [`lock`] - Distributed lock
//! - [`protection`] - Penetration, breakdown and avalanche strategies
//! - `manager`, `coordinator` - Named-cache registry and call-site API
//! - [`config`], [`error`], [`stats`] - Configuration, errors, counters
//!
//! ## Example
//!
//! ```
//! use tiercache_core::{
//!     CacheCoordinator, CacheManager, CacheSettings, InMemoryRemoteStore, RemoteStore,
//! };
//! use std::sync::Arc;
//!
//! let store: Arc<dyn RemoteStore> = Arc::new(InMemoryRemoteStore::new());
//! let manager = Arc::new(CacheManager::with_remote(CacheSettings::default(), store));
//! let coordinator = CacheCoordinator::new(manager);
//!
//! let order = coordinator
//!     .read("orders", "order:42", || Ok(Some(b"{\"id\":42}".to_vec())), None)
//!     .unwrap();
//! assert_eq!(order.as_deref(), Some(b"{\"id\":42}".as_slice()));
//! ```
pub mod cache;
mod cache_entry;
pub mod clock;
mod codec;
pub mod config;
mod coordinator;
pub mod error;
mod key;
mod local_cache;
pub mod lock;
mod manager;
mod multi_level;
pub mod protection;
pub mod remote;
mod remote_cache;
pub mod stats;

pub mod utils;

pub use cache::{Cache, CacheValue, Expiry, Loader, TtlRemaining, MIN_TTL};
pub use cache_entry::CacheEntry;
pub use clock::{system_clock, Clock, ManualClock, SystemClock};
pub use codec::{
    decode_json, encode_json, validate_cache_name, BinarySerializer, KeyCodec, TextSerializer,
    ValueSerializer,
};
pub use config::{
    CacheConfig, CacheOverrides, CacheSettings, LockConfig, LockTimeoutPolicy, ProtectionConfig,
    ProtectionFlags, RemoteFailurePolicy, TierMode,
};
pub use coordinator::{CacheCoordinator, EvictTarget};
pub use error::{CacheError, CacheResult, RemoteError, RemoteResult};
pub use key::{CacheKey, FnKeyEvaluator, KeyExpressionEvaluator};
pub use local_cache::{LocalCache, LocalCacheConfig};
pub use lock::{node_id, DistributedLock, LockHandle, LockState};
pub use manager::CacheManager;
pub use multi_level::MultiLevelCache;
pub use protection::StampedeProtection;
pub use remote::{InMemoryRemoteStore, RemoteStore, StoreCounters};
#[cfg(feature = "redis")]
pub use remote::{RedisStore, RedisStoreConfig};
pub use remote_cache::RemoteCache;
pub use stats::CacheStats;
