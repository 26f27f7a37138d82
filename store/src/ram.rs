use std::collections::HashMap;

use parking_lot::Mutex;

use crate::payload::StoredPayload;
use crate::stats::Stats;

struct Entry<T> {
    value: T,
}

/// An in-memory datastore with the same external interface as
/// [`crate::file::FileStore`] (§4.3), used for tests and as a cache.
/// Eviction is strict LRU: `put` beyond capacity evicts the
/// least-recently-used key.
pub struct RamStore<T> {
    max_keys: Mutex<usize>,
    entries: Mutex<HashMap<[u8; 32], Entry<T>>>,
    access_order: Mutex<Vec<[u8; 32]>>,
    stats: Stats,
}

impl<T: StoredPayload> RamStore<T> {
    pub fn new(max_keys: usize) -> Self {
        RamStore {
            max_keys: Mutex::new(max_keys),
            entries: Mutex::new(HashMap::new()),
            access_order: Mutex::new(Vec::new()),
            stats: Stats::default(),
        }
    }

    fn touch(&self, key: &[u8; 32]) {
        let mut order = self.access_order.lock();
        if let Some(pos) = order.iter().position(|k| k == key) {
            let k = order.remove(pos);
            order.push(k);
        } else {
            order.push(*key);
        }
    }

    pub fn fetch(&self, digested_key: &[u8; 32]) -> Option<T> {
        let entries = self.entries.lock();
        match entries.get(digested_key) {
            Some(entry) => {
                let value = entry.value.clone();
                drop(entries);
                self.touch(digested_key);
                self.stats.record_hit();
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    pub fn put(&self, digested_key: [u8; 32], value: T) {
        {
            let mut entries = self.entries.lock();
            entries.insert(digested_key, Entry { value });
        }
        self.touch(&digested_key);
        self.stats.record_write();
        self.evict_if_needed();
    }

    fn evict_if_needed(&self) {
        let max = *self.max_keys.lock();
        loop {
            let over = self.entries.lock().len() > max;
            if !over {
                break;
            }
            let oldest = {
                let mut order = self.access_order.lock();
                if order.is_empty() {
                    break;
                }
                order.remove(0)
            };
            self.entries.lock().remove(&oldest);
        }
    }

    pub fn probably_in_store(&self, digested_key: &[u8; 32]) -> bool {
        self.entries.lock().contains_key(digested_key)
    }

    pub fn set_max_keys(&self, max_keys: usize) {
        *self.max_keys.lock() = max_keys;
        self.evict_if_needed();
    }

    pub fn key_count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn stats(&self) -> Stats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Debug)]
    struct Dummy(u8);

    impl StoredPayload for Dummy {
        const HEADER_LEN: usize = 0;
        const DATA_LEN: usize = 1;
        fn to_slot_bytes(&self) -> Vec<u8> {
            vec![self.0]
        }
        fn from_slot_bytes(bytes: &[u8]) -> Option<Self> {
            bytes.first().copied().map(Dummy)
        }
    }

    #[test]
    fn put_then_fetch_round_trips() {
        let store = RamStore::<Dummy>::new(4);
        let key = [1u8; 32];
        store.put(key, Dummy(42));
        assert_eq!(store.fetch(&key), Some(Dummy(42)));
    }

    #[test]
    fn eviction_is_strict_lru() {
        let store = RamStore::<Dummy>::new(2);
        let k1 = [1u8; 32];
        let k2 = [2u8; 32];
        let k3 = [3u8; 32];
        store.put(k1, Dummy(1));
        store.put(k2, Dummy(2));
        store.fetch(&k1); // k1 is now more recently used than k2
        store.put(k3, Dummy(3)); // evicts k2, the least recently used
        assert!(store.fetch(&k1).is_some());
        assert!(store.fetch(&k2).is_none());
        assert!(store.fetch(&k3).is_some());
    }
}
