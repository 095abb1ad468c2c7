// Tests for stampede protection applied through the coordinator

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tiercache::{
    CacheConfig, CacheCoordinator, CacheError, CacheManager, CacheResult, CacheSettings, Clock,
    DistributedLock, Expiry, InMemoryRemoteStore, LockConfig, LockTimeoutPolicy, ManualClock,
    ProtectionConfig, ProtectionFlags, RemoteStore, TierMode, TtlRemaining,
};

fn coordinator(
    store: &Arc<InMemoryRemoteStore>,
    clock: Option<Arc<ManualClock>>,
    mode: TierMode,
    protection: ProtectionConfig,
) -> CacheCoordinator {
    let remote: Arc<dyn RemoteStore> = store.clone();
    let settings = CacheSettings::new(CacheConfig {
        mode,
        default_ttl: Some(Duration::from_secs(100)),
        local_ttl: Some(Duration::from_secs(10)),
        protection,
        ..CacheConfig::default()
    });
    let lock_config = LockConfig {
        retry_interval: Duration::from_millis(2),
        ..LockConfig::default()
    };
    let (manager, lock) = match clock {
        Some(clock) => (
            CacheManager::with_remote(settings, remote.clone()).with_clock(clock.clone() as Arc<dyn Clock>),
            DistributedLock::with_clock(remote, lock_config, clock).unwrap(),
        ),
        None => (
            CacheManager::with_remote(settings, remote.clone()),
            DistributedLock::new(remote, lock_config).unwrap(),
        ),
    };
    CacheCoordinator::new(Arc::new(manager)).with_lock(Arc::new(lock))
}

#[test]
fn test_penetration_tombstone_shared_through_remote_tier() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
    let protection = ProtectionConfig::default().with_penetration(Duration::from_secs(30));
    let node_a = coordinator(&store, Some(clock.clone()), TierMode::MultiLevel, protection.clone());
    let node_b = coordinator(&store, Some(clock.clone()), TierMode::MultiLevel, protection);
    let calls = AtomicU32::new(0);
    let missing = || -> CacheResult<Option<Vec<u8>>> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    };

    // Test 1: node A records the absence
    assert_eq!(node_a.read("users", "u:404", missing, None).unwrap(), None);
    assert!(store.exists("users::u:404").unwrap());

    // Test 2: node B is answered by the tombstone
    assert_eq!(node_b.read("users", "u:404", missing, None).unwrap(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let users = node_b.manager().get_cache("users").unwrap();
    assert_eq!(users.stats().tombstone_hits(), 1);

    // Test 3: after the tombstone TTL the loader is consulted again
    clock.advance(Duration::from_secs(31));
    assert_eq!(node_b.read("users", "u:404", missing, None).unwrap(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_tombstone_is_replaced_by_write() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
    let protection = ProtectionConfig::default().with_penetration(Duration::from_secs(30));
    let c = coordinator(&store, Some(clock), TierMode::Remote, protection);

    assert_eq!(c.read("users", "u:1", || Ok(None), None).unwrap(), None);
    c.write("users", "u:1", b"alice".to_vec(), Expiry::Default)
        .unwrap();
    let value = c
        .read("users", "u:1", || panic!("value was written"), None)
        .unwrap();
    assert_eq!(value, Some(b"alice".to_vec()));
}

#[test]
fn test_per_call_flags_override_configuration() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
    let protection = ProtectionConfig::default().with_penetration(Duration::from_secs(30));
    let c = coordinator(&store, Some(clock), TierMode::Remote, protection);
    let calls = AtomicU32::new(0);

    for _ in 0..3 {
        c.read(
            "users",
            "u:9",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            },
            Some(ProtectionFlags::NONE),
        )
        .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(!store.exists("users::u:9").unwrap());
}

#[test]
fn test_avalanche_spreads_expiry_of_bulk_writes() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
    let protection = ProtectionConfig::default().with_avalanche(20);
    let c = coordinator(&store, Some(clock), TierMode::Remote, protection);
    let cache = c.manager().get_cache("products").unwrap();

    let mut distinct = HashSet::new();
    for i in 0..200 {
        let key = format!("sku:{}", i);
        c.write("products", &key, vec![1], Expiry::Default).unwrap();
        match cache.ttl_remaining(&key).unwrap() {
            TtlRemaining::Expires(ttl) => {
                assert!(ttl >= Duration::from_secs(80), "ttl {:?}", ttl);
                assert!(ttl <= Duration::from_secs(120), "ttl {:?}", ttl);
                distinct.insert(ttl);
            }
            other => panic!("expected a finite ttl, got {:?}", other),
        }
    }
    assert!(distinct.len() > 1);
}

#[test]
fn test_avalanche_keeps_no_expiry_writes() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
    let protection = ProtectionConfig::default().with_avalanche(50);
    let c = coordinator(&store, Some(clock), TierMode::Remote, protection);

    c.write("products", "sku:1", vec![1], Expiry::Never).unwrap();
    let cache = c.manager().get_cache("products").unwrap();
    assert_eq!(cache.ttl_remaining("sku:1").unwrap(), TtlRemaining::NoExpiry);
}

#[test]
fn test_breakdown_fallback_when_lock_is_held_elsewhere() {
    let store = Arc::new(InMemoryRemoteStore::new());
    let protection = ProtectionConfig::default().with_breakdown(
        Duration::from_millis(20),
        LockTimeoutPolicy::Fallback(Some(b"placeholder".to_vec())),
    );
    let c = coordinator(&store, None, TierMode::Remote, protection);

    // Another node is recomputing the key
    let other = DistributedLock::new(store.clone(), LockConfig::default()).unwrap();
    let mut held = other.acquire("orders", "order:1", None).unwrap();

    let value = c
        .read("orders", "order:1", || panic!("must not load"), None)
        .unwrap();
    assert_eq!(value, Some(b"placeholder".to_vec()));
    let orders = c.manager().get_cache("orders").unwrap();
    assert_eq!(orders.stats().lock_timeouts(), 1);

    other.release(&mut held).unwrap();
}

#[test]
fn test_breakdown_timeout_serves_value_filled_meanwhile() {
    let store = Arc::new(InMemoryRemoteStore::new());
    let protection = ProtectionConfig::default()
        .with_breakdown(Duration::from_millis(20), LockTimeoutPolicy::Fail);
    let c = coordinator(&store, None, TierMode::Remote, protection);

    let other = DistributedLock::new(store.clone(), LockConfig::default()).unwrap();
    let mut held = other.acquire("orders", "order:1", None).unwrap();

    // Nothing cached yet: the Fail policy surfaces the timeout
    let err = c
        .read("orders", "order:1", || panic!("must not load"), None)
        .unwrap_err();
    assert!(err.is_lock_timeout());

    // The holder finishes its work but has not released yet
    c.write("orders", "order:1", b"v".to_vec(), Expiry::Default)
        .unwrap();
    let value = c
        .read("orders", "order:1", || panic!("must not load"), None)
        .unwrap();
    assert_eq!(value, Some(b"v".to_vec()));

    other.release(&mut held).unwrap();
}

#[test]
fn test_breakdown_without_lock_is_configuration_error() {
    let store: Arc<dyn RemoteStore> = Arc::new(InMemoryRemoteStore::new());
    let settings = CacheSettings::new(CacheConfig {
        mode: TierMode::Remote,
        protection: ProtectionConfig::default()
            .with_breakdown(Duration::from_millis(20), LockTimeoutPolicy::LoadWithoutLock),
        ..CacheConfig::default()
    });
    let c = CacheCoordinator::new(Arc::new(CacheManager::with_remote(settings, store)));

    let err = c.read("orders", "order:1", || Ok(None), None).unwrap_err();
    assert!(matches!(err, CacheError::Configuration { .. }));
}
