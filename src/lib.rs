//! # Tiercache
//!
//! Multi-tier read-through / write-through caching for services that run as
//! several processes in front of one shared key-value store.
//!
//! ## Features
//!
//! - **Local, remote and multi-level caches** behind one [`Cache`] trait
//! - **Stampede protection**: tombstones for keys missing upstream, a
//!   per-key distributed lock so one caller recomputes an expired hot key,
//!   and TTL jitter against synchronized expiry
//! - **Distributed lock** with finite leases and token-checked release
//! - **Explicit wiring**: build a [`CacheManager`], hand it to a
//!   [`CacheCoordinator`], call `read` / `write` / `evict`
//! - **Pluggable remote store**: in-memory for tests, Redis with the `redis`
//!   feature
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tiercache::{
//!     CacheCoordinator, CacheManager, CacheOverrides, CacheSettings, DistributedLock,
//!     InMemoryRemoteStore, LockConfig, LockTimeoutPolicy, ProtectionConfig, RemoteStore,
//! };
//!
//! let store: Arc<dyn RemoteStore> = Arc::new(InMemoryRemoteStore::new());
//!
//! let settings = CacheSettings::default().with_cache(
//!     "orders",
//!     CacheOverrides {
//!         default_ttl: Some(Duration::from_secs(60)),
//!         local_ttl: Some(Duration::from_secs(10)),
//!         protection: Some(
//!             ProtectionConfig::default()
//!                 .with_penetration(Duration::from_secs(30))
//!                 .with_breakdown(Duration::from_millis(500), LockTimeoutPolicy::LoadWithoutLock)
//!                 .with_avalanche(10),
//!         ),
//!         ..CacheOverrides::default()
//!     },
//! );
//!
//! let manager = Arc::new(CacheManager::with_remote(settings, store.clone()));
//! let lock = Arc::new(DistributedLock::new(store, LockConfig::default()).unwrap());
//! let coordinator = CacheCoordinator::new(manager).with_lock(lock);
//!
//! let order = coordinator
//!     .read("orders", "order:42", || Ok(Some(b"order 42".to_vec())), None)
//!     .unwrap();
//! assert_eq!(order, Some(b"order 42".to_vec()));
//!
//! // Missing upstream: cached as a tombstone, the loader is not asked again.
//! let missing = coordinator.read("orders", "order:0", || Ok(None), None).unwrap();
//! assert_eq!(missing, None);
//! let again = coordinator
//!     .read("orders", "order:0", || panic!("tombstone should answer"), None)
//!     .unwrap();
//! assert_eq!(again, None);
//! ```
//!
//! ## Typed values
//!
//! [`CacheCoordinator::read_as`] and [`CacheCoordinator::write_as`] store any
//! serde type as JSON:
//!
//! ```rust
//! use std::sync::Arc;
//! use tiercache::{CacheConfig, CacheCoordinator, CacheManager, CacheSettings, Expiry, TierMode};
//!
//! let manager = Arc::new(CacheManager::new(CacheSettings::new(CacheConfig {
//!     mode: TierMode::Local,
//!     ..CacheConfig::default()
//! })));
//! let coordinator = CacheCoordinator::new(manager);
//!
//! coordinator.write_as("scores", "alice", &vec![3u32, 5, 8], Expiry::Default).unwrap();
//! let scores: Option<Vec<u32>> = coordinator
//!     .read_as("scores", "alice", || Ok(None), None)
//!     .unwrap();
//! assert_eq!(scores, Some(vec![3, 5, 8]));
//! ```
//!
//! ## Multi-level consistency
//!
//! Writes go to the remote tier first and then the local tier. Other
//! processes are not notified: their local copies expire after `local_ttl`,
//! which is therefore mandatory for multi-level caches.
//!
//! ## Logging
//!
//! The crate logs through `tracing` and never installs a subscriber.

pub use tiercache_core::*;
