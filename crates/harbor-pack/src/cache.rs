//! FIFO cache for computed deltas.

use std::collections::{HashMap, VecDeque};

use harbor_hash::Oid;

/// Default number of cached deltas.
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded FIFO map from target OID to `(base_oid, delta_bytes)`.
///
/// Insertion order is eviction order; re-inserting an existing key refreshes
/// its bytes but not its position.
#[derive(Debug)]
pub struct DeltaCache {
    capacity: usize,
    order: VecDeque<Oid>,
    map: HashMap<Oid, (Oid, Vec<u8>)>,
}

impl DeltaCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            map: HashMap::new(),
        }
    }

    pub fn insert(&mut self, target: Oid, base: Oid, delta: Vec<u8>) {
        if self.map.insert(target, (base, delta)).is_none() {
            self.order.push_back(target);
            if self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                }
            }
        }
    }

    pub fn get(&self, target: &Oid) -> Option<&(Oid, Vec<u8>)> {
        self.map.get(target)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for DeltaCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> Oid {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Oid::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn insert_and_get() {
        let mut cache = DeltaCache::default();
        cache.insert(oid(1), oid(2), vec![1, 2, 3]);
        let (base, delta) = cache.get(&oid(1)).unwrap();
        assert_eq!(*base, oid(2));
        assert_eq!(delta, &[1, 2, 3]);
        assert!(cache.get(&oid(9)).is_none());
    }

    #[test]
    fn evicts_oldest_first() {
        let mut cache = DeltaCache::new(2);
        cache.insert(oid(1), oid(0), vec![1]);
        cache.insert(oid(2), oid(0), vec![2]);
        cache.insert(oid(3), oid(0), vec![3]);

        assert!(cache.get(&oid(1)).is_none());
        assert!(cache.get(&oid(2)).is_some());
        assert!(cache.get(&oid(3)).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinsert_updates_without_growing() {
        let mut cache = DeltaCache::new(2);
        cache.insert(oid(1), oid(0), vec![1]);
        cache.insert(oid(1), oid(0), vec![9]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&oid(1)).unwrap().1, vec![9]);
    }
}
