//! Bounded storage for per-key state.
//!
//! [`FifoStorage`] is a sharded map with a hard size bound. When a new key would
//! push it past `max_entries`, the oldest-inserted entry is evicted first.
//! Reading or updating an entry never changes its eviction position.

use crate::application::metrics::Metrics;
use crate::application::ports::Storage;
use ahash::RandomState;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct Slot<V> {
    value: V,
    seq: u64,
}

/// Insertion order of live keys. A key removed outside of eviction may leave a
/// stale entry here until the next `retain` or eviction pass skips it.
#[derive(Debug)]
struct InsertionOrder<K> {
    queue: VecDeque<(K, u64)>,
    next_seq: u64,
}

/// Thread-safe bounded storage backed by DashMap.
///
/// Updates to an existing key only take that key's shard lock. Inserting a new
/// key additionally takes the insertion-order lock, which serializes all
/// insertions and so keeps `len() <= max_entries` after every call. Locks are
/// always taken in the order insertion-order then shard.
pub struct FifoStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    map: DashMap<K, Slot<V>, RandomState>,
    order: Mutex<InsertionOrder<K>>,
    max_entries: usize,
    metrics: Option<Metrics>,
}

impl<K, V> FifoStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a store holding at most `max_entries` entries (at least one).
    pub fn new(max_entries: usize) -> Self {
        Self {
            map: DashMap::with_hasher(RandomState::new()),
            order: Mutex::new(InsertionOrder {
                queue: VecDeque::new(),
                next_seq: 0,
            }),
            max_entries: max_entries.max(1),
            metrics: None,
        }
    }

    /// Count evictions in `metrics`.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Copy of the value stored for `key`.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.map.get(key).map(|slot| slot.value.clone())
    }

    fn lock_order(&self) -> MutexGuard<'_, InsertionOrder<K>> {
        self.order
            .lock()
            .expect("FifoStorage order mutex poisoned - a thread panicked while inserting")
    }

    /// Evict oldest entries until one more fits. Caller holds the order lock.
    fn make_room(&self, order: &mut InsertionOrder<K>) {
        while self.map.len() >= self.max_entries {
            let Some((key, seq)) = order.queue.pop_front() else {
                break;
            };
            if self.map.remove_if(&key, |_, slot| slot.seq == seq).is_some() {
                if let Some(metrics) = &self.metrics {
                    metrics.record_eviction();
                }
            }
        }
    }
}

impl<K, V> fmt::Debug for FifoStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FifoStorage")
            .field("len", &self.map.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl<K, V> Storage<K, V> for FifoStorage<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        if let Some(mut slot) = self.map.get_mut(&key) {
            return accessor(&mut slot.value);
        }

        let mut order = self.lock_order();

        // Another thread may have inserted the key while we waited
        if let Some(mut slot) = self.map.get_mut(&key) {
            drop(order);
            return accessor(&mut slot.value);
        }

        self.make_room(&mut order);

        let seq = order.next_seq;
        order.next_seq += 1;
        order.queue.push_back((key.clone(), seq));

        let mut slot = self.map.entry(key).or_insert(Slot {
            value: factory(),
            seq,
        });
        drop(order);
        accessor(&mut slot.value)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn clear(&self) {
        let mut order = self.lock_order();
        self.map.clear();
        order.queue.clear();
    }

    fn retain<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let mut removed = 0;
        self.map.retain(|key, slot| {
            let keep = f(key, &mut slot.value);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            let mut order = self.lock_order();
            order.queue.retain(|(key, seq)| {
                self.map
                    .get(key)
                    .map_or(false, |slot| slot.seq == *seq)
            });
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn touch(storage: &FifoStorage<&'static str, u32>, key: &'static str) -> u32 {
        storage.with_entry_mut(
            key,
            || 0,
            |v| {
                *v += 1;
                *v
            },
        )
    }

    #[test]
    fn test_basic_operations() {
        let storage = FifoStorage::new(10);

        assert_eq!(touch(&storage, "a"), 1);
        assert_eq!(touch(&storage, "a"), 2);
        assert_eq!(touch(&storage, "b"), 1);

        assert_eq!(storage.get(&"a"), Some(2));
        assert_eq!(storage.get(&"c"), None);
        assert_eq!(storage.len(), 2);
        assert!(!storage.is_empty());
    }

    #[test]
    fn test_evicts_oldest_inserted_not_least_recent() {
        let storage = FifoStorage::new(2);

        touch(&storage, "a");
        touch(&storage, "b");
        // Recent use of "a" does not protect it
        touch(&storage, "a");
        touch(&storage, "c");

        assert!(!storage.contains_key(&"a"));
        assert!(storage.contains_key(&"b"));
        assert!(storage.contains_key(&"c"));
        assert_eq!(storage.len(), 2);
    }

    #[test]
    fn test_bound_holds_for_many_keys() {
        let metrics = Metrics::new();
        let storage = FifoStorage::new(16).with_metrics(metrics.clone());

        for i in 0..1000u32 {
            storage.with_entry_mut(i, || 0u32, |v| *v += 1);
            assert!(storage.len() <= 16);
        }

        assert_eq!(storage.len(), 16);
        assert_eq!(metrics.evicted(), 1000 - 16);
        // The survivors are the last sixteen inserted
        assert!((984..1000).all(|i| storage.contains_key(&i)));
    }

    #[test]
    fn test_retain_reports_removed_and_prunes_order() {
        let metrics = Metrics::new();
        let storage = FifoStorage::new(2).with_metrics(metrics.clone());

        touch(&storage, "a");
        touch(&storage, "b");

        let removed = storage.retain(|key, _| *key != "a");
        assert_eq!(removed, 1);
        assert_eq!(storage.lock_order().queue.len(), 1);

        // Room was freed by retain, so no eviction here
        touch(&storage, "c");
        assert_eq!(metrics.evicted(), 0);

        touch(&storage, "d");
        assert_eq!(metrics.evicted(), 1);
        assert!(!storage.contains_key(&"b"));
        assert!(storage.contains_key(&"c"));
        assert!(storage.contains_key(&"d"));
    }

    #[test]
    fn test_reinserted_key_gets_new_position() {
        let storage = FifoStorage::new(2);

        touch(&storage, "a");
        touch(&storage, "b");
        storage.retain(|key, _| *key != "a");
        touch(&storage, "a");
        touch(&storage, "c");

        // "b" is now the oldest
        assert!(!storage.contains_key(&"b"));
        assert_eq!(storage.get(&"a"), Some(1));
    }

    #[test]
    fn test_clear() {
        let storage = FifoStorage::new(4);
        touch(&storage, "a");
        touch(&storage, "b");

        storage.clear();
        assert!(storage.is_empty());
        assert!(storage.lock_order().queue.is_empty());

        touch(&storage, "a");
        assert_eq!(storage.get(&"a"), Some(1));
    }

    #[test]
    fn test_zero_bound_still_holds_one() {
        let storage = FifoStorage::new(0);
        touch(&storage, "a");
        touch(&storage, "b");
        assert_eq!(storage.max_entries(), 1);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let storage = Arc::new(FifoStorage::new(100));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let storage = Arc::clone(&storage);
                thread::spawn(move || {
                    for i in 0..500u32 {
                        storage.with_entry_mut(format!("key_{}_{}", t, i % 50), || 0u32, |v| {
                            *v += 1
                        });
                        storage.with_entry_mut("shared".to_string(), || 0u32, |v| *v += 1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(storage.len() <= 100);
    }

    #[test]
    fn test_concurrent_updates_to_one_key_are_serialized() {
        use std::thread;

        let storage = Arc::new(FifoStorage::new(10));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let storage = Arc::clone(&storage);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        storage.with_entry_mut("k", || 0u32, |v| *v += 1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(storage.get(&"k"), Some(8000));
    }
}
