// Copyright 2025 Recollect Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Bounded, time-windowed cache for assembled context
//!
//! Entries are evicted strictly in insertion order once the cache exceeds
//! its capacity. Reads never refresh an entry's position.

use crate::config::ContextCacheConfig;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// Cache key: the query prefix plus who asked and for which scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextCacheKey {
    pub query_prefix: String,
    pub consumer: String,
    pub scope: String,
}

impl ContextCacheKey {
    /// Key on the first `prefix_chars` characters of the normalized query
    pub fn new(query: &str, consumer: &str, scope: &str, prefix_chars: usize) -> Self {
        Self {
            query_prefix: query.trim().to_lowercase().chars().take(prefix_chars).collect(),
            consumer: consumer.to_string(),
            scope: scope.to_string(),
        }
    }
}

struct Slot<V> {
    value: V,
    inserted_at: Instant,
    seq: u64,
}

struct Inner<V> {
    slots: HashMap<ContextCacheKey, Slot<V>>,
    /// Insertion sequence -> key; the first entry is the oldest
    order: BTreeMap<u64, ContextCacheKey>,
    next_seq: u64,
}

impl<V> Inner<V> {
    fn remove(&mut self, key: &ContextCacheKey) {
        if let Some(slot) = self.slots.remove(key) {
            self.order.remove(&slot.seq);
        }
    }
}

/// Insertion-ordered cache with a freshness window
pub struct ContextCache<V> {
    inner: Mutex<Inner<V>>,
    capacity: usize,
    window: Duration,
}

impl<V: Clone> ContextCache<V> {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: HashMap::with_capacity(capacity + 1),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            capacity,
            window,
        }
    }

    pub fn from_config(config: &ContextCacheConfig) -> Self {
        Self::new(config.capacity, config.window())
    }

    /// Cached value if it is younger than the window. Stale entries are dropped.
    pub fn get(&self, key: &ContextCacheKey) -> Option<V> {
        let mut inner = self.inner.lock();
        let fresh = match inner.slots.get(key) {
            Some(slot) => slot.inserted_at.elapsed() < self.window,
            None => return None,
        };

        if fresh {
            inner.slots.get(key).map(|slot| slot.value.clone())
        } else {
            inner.remove(key);
            None
        }
    }

    /// Insert or overwrite, then evict the oldest entries beyond capacity
    pub fn put(&self, key: ContextCacheKey, value: V) {
        let mut inner = self.inner.lock();
        inner.remove(&key);

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.clone());
        inner.slots.insert(
            key,
            Slot {
                value,
                inserted_at: Instant::now(),
                seq,
            },
        );

        while inner.slots.len() > self.capacity {
            let Some((_, oldest)) = inner.order.pop_first() else {
                break;
            };
            inner.slots.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: usize) -> ContextCacheKey {
        ContextCacheKey::new(&format!("query {}", i), "shopping", "u1", 50)
    }

    #[test]
    fn test_key_prefix() {
        let a = ContextCacheKey::new("  Where Is My ORDER?  ", "support", "u1", 8);
        let b = ContextCacheKey::new("where is my parcel", "support", "u1", 8);
        assert_eq!(a.query_prefix, "where is");
        assert_eq!(a, b);
        assert_ne!(a, ContextCacheKey::new("where is", "sales", "u1", 8));
        assert_ne!(a, ContextCacheKey::new("where is", "support", "u2", 8));
    }

    #[test]
    fn test_put_get_overwrite() {
        let cache = ContextCache::new(10, Duration::from_secs(300));
        assert!(cache.is_empty());
        cache.put(key(1), "a".to_string());
        assert_eq!(cache.get(&key(1)).as_deref(), Some("a"));
        cache.put(key(1), "b".to_string());
        assert_eq!(cache.get(&key(1)).as_deref(), Some("b"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key(2)).is_none());
    }

    #[test]
    fn test_eviction_in_insertion_order_ignores_reads() {
        let cap = 100;
        let k = 7;
        let cache = ContextCache::new(cap, Duration::from_secs(300));

        for i in 0..cap {
            cache.put(key(i), i);
        }
        // Reading the oldest entries does not protect them
        for i in 0..k {
            assert_eq!(cache.get(&key(i)), Some(i));
        }
        for i in cap..cap + k {
            cache.put(key(i), i);
        }

        assert_eq!(cache.len(), cap);
        for i in 0..k {
            assert!(cache.get(&key(i)).is_none());
        }
        for i in k..cap + k {
            assert_eq!(cache.get(&key(i)), Some(i));
        }
    }

    #[test]
    fn test_overwrite_moves_to_newest() {
        let cache = ContextCache::new(2, Duration::from_secs(300));
        cache.put(key(0), 0);
        cache.put(key(1), 1);
        cache.put(key(0), 10);
        cache.put(key(2), 2);

        assert!(cache.get(&key(1)).is_none());
        assert_eq!(cache.get(&key(0)), Some(10));
        assert_eq!(cache.get(&key(2)), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry() {
        let cache = ContextCache::new(10, Duration::from_secs(300));
        cache.put(key(1), 1);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&key(1)), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&key(1)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = ContextCache::from_config(&ContextCacheConfig::default());
        cache.put(key(1), 1);
        cache.put(key(2), 2);
        cache.clear();
        assert!(cache.is_empty());
        cache.put(key(3), 3);
        assert_eq!(cache.len(), 1);
    }
}
