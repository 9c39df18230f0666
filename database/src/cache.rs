use indexmap::IndexMap;
use parking_lot::RwLock;
use rand::Rng;
use std::hash::Hash;

/// A bounded concurrent cache with random eviction. Entry count is the
/// capacity unit; eviction picks a uniformly random victim.
pub struct Cache<TKey: Clone + Hash + Eq + Send + Sync, TData: Clone + Send + Sync> {
    map: RwLock<IndexMap<TKey, TData>>,
    size: u64,
}

impl<TKey: Clone + Hash + Eq + Send + Sync, TData: Clone + Send + Sync> Cache<TKey, TData> {
    pub fn new(size: u64) -> Self {
        Self { map: RwLock::new(IndexMap::with_capacity(size as usize)), size }
    }

    pub fn get(&self, key: &TKey) -> Option<TData> {
        self.map.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &TKey) -> bool {
        self.map.read().contains_key(key)
    }

    pub fn insert(&self, key: TKey, data: TData) {
        if self.size == 0 {
            return;
        }
        let mut write_guard = self.map.write();
        if write_guard.len() as u64 >= self.size && !write_guard.contains_key(&key) {
            let victim = rand::thread_rng().gen_range(0..write_guard.len());
            write_guard.swap_remove_index(victim);
        }
        write_guard.insert(key, data);
    }

    pub fn remove(&self, key: &TKey) -> Option<TData> {
        self.map.write().swap_remove(key)
    }

    pub fn remove_many(&self, keys: &mut impl Iterator<Item = TKey>) {
        let mut write_guard = self.map.write();
        for key in keys {
            write_guard.swap_remove(&key);
        }
    }

    pub fn clear(&self) {
        self.map.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_insertion() {
        let cache: Cache<u64, u64> = Cache::new(4);
        for i in 0..100 {
            cache.insert(i, i * 10);
        }
        let present = (0..100).filter(|i| cache.contains_key(i)).count();
        assert_eq!(present, 4);
    }

    #[test]
    fn test_zero_capacity() {
        let cache: Cache<u64, u64> = Cache::new(0);
        cache.insert(1, 1);
        assert!(cache.get(&1).is_none());
    }
}
