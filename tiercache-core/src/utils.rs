//! Order-queue helpers for the local tier.
//!
//! The local cache keeps a `HashMap` of entries plus a `VecDeque` recording
//! recency (front = least recently used). These helpers keep the two in sync.

use crate::CacheEntry;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Moves a key to the end of the order queue (marks it most recently used).
///
/// Keys not present in the queue are ignored.
///
/// # Examples
///
/// ```
/// use std::collections::VecDeque;
/// use tiercache_core::utils::move_key_to_end;
///
/// let mut order = VecDeque::from(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
/// move_key_to_end(&mut order, "b");
/// assert_eq!(order.back().unwrap(), "b");
///
/// move_key_to_end(&mut order, "zzz");
/// assert_eq!(order.len(), 3);
/// ```
pub fn move_key_to_end(order: &mut VecDeque<String>, key: &str) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        if let Some(k) = order.remove(pos) {
            order.push_back(k);
        }
    }
}

/// Removes a key from both the map and the order queue.
///
/// Returns `true` if the key was found in either structure.
pub fn remove_key(
    map: &mut HashMap<String, CacheEntry>,
    order: &mut VecDeque<String>,
    key: &str,
) -> bool {
    let removed_from_map = map.remove(key).is_some();
    let removed_from_order = match order.iter().position(|k| k == key) {
        Some(pos) => order.remove(pos).is_some(),
        None => false,
    };
    removed_from_map || removed_from_order
}

/// Drops every expired entry. Returns how many live-map entries were removed.
pub fn purge_expired(
    map: &mut HashMap<String, CacheEntry>,
    order: &mut VecDeque<String>,
    now: Instant,
    access_ttl: Option<Duration>,
) -> usize {
    let before = map.len();
    map.retain(|_, entry| !entry.is_expired(now, access_ttl));
    order.retain(|k| map.contains_key(k));
    before - map.len()
}

/// Evicts the least recently used entry.
///
/// Keys at the front of the queue that are no longer in the map (orphans)
/// are skipped until a real entry is removed.
pub fn pop_lru(map: &mut HashMap<String, CacheEntry>, order: &mut VecDeque<String>) -> Option<String> {
    while let Some(key) = order.pop_front() {
        if map.remove(&key).is_some() {
            return Some(key);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheValue;

    fn entry(now: Instant, ttl: Option<Duration>) -> CacheEntry {
        CacheEntry::new(CacheValue::Present(vec![0]), now, ttl)
    }

    #[test]
    fn test_pop_lru_skips_orphans() {
        let now = Instant::now();
        let mut map = HashMap::new();
        map.insert("b".to_string(), entry(now, None));
        let mut order = VecDeque::from(vec!["a".to_string(), "b".to_string()]);

        assert_eq!(pop_lru(&mut map, &mut order), Some("b".to_string()));
        assert!(map.is_empty());
        assert!(order.is_empty());
        assert_eq!(pop_lru(&mut map, &mut order), None);
    }

    #[test]
    fn test_purge_expired_keeps_live_entries() {
        let now = Instant::now();
        let mut map = HashMap::new();
        map.insert("dead".to_string(), entry(now, Some(Duration::from_millis(1))));
        map.insert("live".to_string(), entry(now, None));
        let mut order = VecDeque::from(vec!["dead".to_string(), "live".to_string()]);

        let purged = purge_expired(&mut map, &mut order, now + Duration::from_millis(2), None);
        assert_eq!(purged, 1);
        assert_eq!(order, VecDeque::from(vec!["live".to_string()]));
    }

    #[test]
    fn test_remove_key_reports_absence() {
        let mut map = HashMap::new();
        let mut order = VecDeque::new();
        assert!(!remove_key(&mut map, &mut order, "missing"));
    }
}
