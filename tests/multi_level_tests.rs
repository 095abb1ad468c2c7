// Tests for the multi-level (local + remote) read and write paths
//
// Two CacheManagers sharing one InMemoryRemoteStore stand in for two
// processes of the same service.

use std::sync::Arc;
use std::time::Duration;
use tiercache::{
    Cache, CacheConfig, CacheError, CacheManager, CacheSettings, CacheValue, Clock, Expiry,
    InMemoryRemoteStore, ManualClock, RemoteStore, TierMode,
};

fn settings() -> CacheSettings {
    CacheSettings::new(CacheConfig {
        mode: TierMode::MultiLevel,
        default_ttl: Some(Duration::from_secs(300)),
        local_ttl: Some(Duration::from_secs(10)),
        ..CacheConfig::default()
    })
}

fn process(store: &Arc<InMemoryRemoteStore>, clock: &Arc<ManualClock>) -> CacheManager {
    let remote: Arc<dyn RemoteStore> = store.clone();
    CacheManager::with_remote(settings(), remote).with_clock(clock.clone() as Arc<dyn Clock>)
}

fn bytes(s: &str) -> CacheValue {
    CacheValue::Present(s.as_bytes().to_vec())
}

#[test]
fn test_remote_hit_is_promoted_to_local() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
    let writer = process(&store, &clock).get_cache("products").unwrap();
    let reader = process(&store, &clock).get_cache("products").unwrap();

    writer.put("sku:1", bytes("kettle"), Expiry::Default).unwrap();
    store.counters().reset();

    // First read goes to the remote tier
    assert_eq!(reader.get("sku:1").unwrap(), Some(bytes("kettle")));
    assert_eq!(store.counters().gets(), 1);

    // Second read is answered locally
    assert_eq!(reader.get("sku:1").unwrap(), Some(bytes("kettle")));
    assert_eq!(store.counters().gets(), 1);
    assert_eq!(reader.stats().remote_hits(), 1);
    assert_eq!(reader.stats().hits(), 2);
}

#[test]
fn test_other_process_staleness_bounded_by_local_ttl() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
    let a = process(&store, &clock).get_cache("products").unwrap();
    let b = process(&store, &clock).get_cache("products").unwrap();

    a.put("sku:1", bytes("v1"), Expiry::Default).unwrap();
    assert_eq!(b.get("sku:1").unwrap(), Some(bytes("v1")));

    a.put("sku:1", bytes("v2"), Expiry::Default).unwrap();

    // b still serves its local copy until localTTL passes
    clock.advance(Duration::from_secs(9));
    assert_eq!(b.get("sku:1").unwrap(), Some(bytes("v1")));
    clock.advance(Duration::from_secs(1));
    assert_eq!(b.get("sku:1").unwrap(), Some(bytes("v2")));
}

#[test]
fn test_evict_removes_from_both_tiers() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
    let cache = process(&store, &clock).get_cache("products").unwrap();

    cache.put("sku:1", bytes("v"), Expiry::Default).unwrap();
    cache.evict("sku:1").unwrap();
    assert_eq!(cache.get("sku:1").unwrap(), None);
    assert!(!store.exists("products::sku:1").unwrap());

    // Evicting again is a no-op
    cache.evict("sku:1").unwrap();
}

#[test]
fn test_evict_all_clears_shared_tier() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
    let cache = process(&store, &clock).get_cache("products").unwrap();
    let other = process(&store, &clock).get_cache("other").unwrap();

    for i in 0..5 {
        cache
            .put(&format!("sku:{}", i), bytes("v"), Expiry::Default)
            .unwrap();
    }
    other.put("x", bytes("y"), Expiry::Default).unwrap();
    assert_eq!(cache.size().unwrap(), 5);

    cache.evict_all().unwrap();
    assert_eq!(cache.size().unwrap(), 0);
    assert_eq!(cache.get("sku:3").unwrap(), None);
    assert_eq!(other.size().unwrap(), 1);
}

#[test]
fn test_put_if_absent_is_decided_by_remote_tier() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
    let a = process(&store, &clock).get_cache("products").unwrap();
    let b = process(&store, &clock).get_cache("products").unwrap();

    assert!(a.put_if_absent("sku:1", bytes("a"), Expiry::Default).unwrap());
    assert!(!b.put_if_absent("sku:1", bytes("b"), Expiry::Default).unwrap());
    assert_eq!(b.get("sku:1").unwrap(), Some(bytes("a")));
}

#[test]
fn test_touch_ttl_extends_remote_entry() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
    let cache = process(&store, &clock).get_cache("products").unwrap();

    cache
        .put("sku:1", bytes("v"), Expiry::After(Duration::from_secs(20)))
        .unwrap();
    clock.advance(Duration::from_secs(15));
    assert!(cache
        .touch_ttl("sku:1", Expiry::After(Duration::from_secs(60)))
        .unwrap());
    clock.advance(Duration::from_secs(30));
    assert!(cache.contains_key("sku:1").unwrap());
    assert!(!cache.touch_ttl("nope", Expiry::Default).unwrap());
}

#[test]
fn test_infinite_local_ttl_rejected_at_creation() {
    let store: Arc<dyn RemoteStore> = Arc::new(InMemoryRemoteStore::new());
    let manager = CacheManager::with_remote(
        CacheSettings::new(CacheConfig {
            mode: TierMode::MultiLevel,
            local_ttl: None,
            ..CacheConfig::default()
        }),
        store,
    );
    let err = manager.get_cache("products").err().unwrap();
    assert!(matches!(err, CacheError::Configuration { .. }));
}
