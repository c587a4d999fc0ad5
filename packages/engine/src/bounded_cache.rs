//! Bounded, TTL-evicting cache used to deduplicate confirmation-monitor
//! alerts within a 5-minute window. Generalized to an arbitrary hashable
//! key since alerts are keyed by `(subject id, alert kind)` rather than a
//! fixed-size digest.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Bounded cache with TTL and max-size eviction. `insert` returns `true`
/// the first time a key is seen (or after its TTL has elapsed), `false` if
/// it's a duplicate within the window — callers use the return value to
/// decide whether to actually emit an alert.
pub struct DedupCache<K> {
    map: HashMap<K, Instant>,
    max_size: usize,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone> DedupCache<K> {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            max_size,
            ttl,
        }
    }

    /// Records `key` as seen now. Returns `true` if this is a fresh alert
    /// (not seen within `ttl`), `false` if it should be suppressed as a
    /// duplicate.
    pub fn should_alert(&mut self, key: K) -> bool {
        let now = Instant::now();
        self.map.retain(|_, t| now.duration_since(*t) < self.ttl);

        if let Some(last) = self.map.get(&key) {
            if now.duration_since(*last) < self.ttl {
                return false;
            }
        }

        while self.map.len() >= self.max_size && !self.map.is_empty() {
            let oldest = self.map.iter().min_by_key(|(_, t)| **t).map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    self.map.remove(&k);
                }
                None => break,
            }
        }

        self.map.insert(key, now);
        true
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_alert_fires() {
        let mut cache = DedupCache::new(10, Duration::from_secs(300));
        assert!(cache.should_alert("withdrawal-stuck:abc"));
    }

    #[test]
    fn duplicate_within_window_is_suppressed() {
        let mut cache = DedupCache::new(10, Duration::from_secs(300));
        assert!(cache.should_alert("abc"));
        assert!(!cache.should_alert("abc"));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut cache = DedupCache::new(2, Duration::from_secs(300));
        assert!(cache.should_alert("a"));
        assert!(cache.should_alert("b"));
        assert!(cache.should_alert("c"));
        assert_eq!(cache.len(), 2);
        assert!(cache.should_alert("a"));
    }
}
