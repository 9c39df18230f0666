use crate::processes::reachability::interval::Interval;
use braid_consensus_core::{blockhash, BlockHashMap, BlockHashes};
use braid_database::prelude::{BatchDbWriter, CachedDbAccess, DbKey, StorePrefix, StoreError, StoreResult, DB};
use braid_hashes::Hash;
use parking_lot::{RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard};
use rocksdb::WriteBatch;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry::Vacant;
use std::sync::Arc;

/// The reachability labeling of a block: its position in the selected-parent
/// tree (parent, children, interval) and the ordered list of merge-edge
/// descendants covering its future outside the tree.
#[derive(Clone, Serialize, Deserialize)]
pub struct ReachabilityData {
    pub parent: Hash,
    pub children: BlockHashes,
    pub interval: Interval,
    pub future_covering_set: BlockHashes,
}

impl ReachabilityData {
    pub fn new(parent: Hash, interval: Interval) -> Self {
        Self { parent, children: Arc::new(vec![]), interval, future_covering_set: Arc::new(vec![]) }
    }
}

/// Reader API for `ReachabilityStore`.
pub trait ReachabilityStoreReader {
    fn has(&self, hash: Hash) -> StoreResult<bool>;
    fn get_interval(&self, hash: Hash) -> StoreResult<Interval>;
    /// Returns the reachability *tree* parent of `hash`
    fn get_parent(&self, hash: Hash) -> StoreResult<Hash>;
    /// Returns the reachability *tree* children of `hash`
    fn get_children(&self, hash: Hash) -> StoreResult<BlockHashes>;
    fn get_future_covering_set(&self, hash: Hash) -> StoreResult<BlockHashes>;
}

/// Write API for `ReachabilityStore`. All write functions are deliberately
/// `mut` since reachability writes are not append-only and must be guarded.
pub trait ReachabilityStore: ReachabilityStoreReader {
    fn init_origin(&mut self, origin: Hash, capacity: Interval) -> StoreResult<()>;
    fn insert(&mut self, hash: Hash, parent: Hash, interval: Interval) -> StoreResult<()>;
    fn set_interval(&mut self, hash: Hash, interval: Interval) -> StoreResult<()>;
    fn append_child(&mut self, hash: Hash, child: Hash) -> StoreResult<()>;
    fn insert_future_covering_item(&mut self, hash: Hash, fci: Hash, insertion_index: usize) -> StoreResult<()>;
}

/// A DB + cache implementation of `ReachabilityStore` trait, with concurrent
/// readers support.
pub struct DbReachabilityStore {
    access: Arc<CachedDbAccess<Hash, Arc<ReachabilityData>>>,
}

impl DbReachabilityStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { access: Arc::new(CachedDbAccess::new(db, cache_size, StorePrefix::Reachability.into())) }
    }
}

impl ReachabilityStoreReader for DbReachabilityStore {
    fn has(&self, hash: Hash) -> StoreResult<bool> {
        self.access.has(hash)
    }

    fn get_interval(&self, hash: Hash) -> StoreResult<Interval> {
        Ok(self.access.read(hash)?.interval)
    }

    fn get_parent(&self, hash: Hash) -> StoreResult<Hash> {
        Ok(self.access.read(hash)?.parent)
    }

    fn get_children(&self, hash: Hash) -> StoreResult<BlockHashes> {
        Ok(Arc::clone(&self.access.read(hash)?.children))
    }

    fn get_future_covering_set(&self, hash: Hash) -> StoreResult<BlockHashes> {
        Ok(Arc::clone(&self.access.read(hash)?.future_covering_set))
    }
}

/// A staging store accumulating reachability writes in memory and committing
/// them to a `WriteBatch` atomically. Concurrent readers observe either the
/// pre-staging labeling or the fully committed one, never a partial reindex.
pub struct StagingReachabilityStore<'a> {
    store_read: RwLockUpgradableReadGuard<'a, DbReachabilityStore>,
    staging_writes: BlockHashMap<ReachabilityData>,
}

impl<'a> StagingReachabilityStore<'a> {
    pub fn new(store_read: RwLockUpgradableReadGuard<'a, DbReachabilityStore>) -> Self {
        Self { store_read, staging_writes: BlockHashMap::new() }
    }

    /// Writes all staged data into `batch` and upgrades to a write guard,
    /// publishing the staged view to subsequent readers. The guard must be
    /// held until the batch is committed to the DB.
    pub fn commit(self, batch: &mut WriteBatch) -> StoreResult<RwLockWriteGuard<'a, DbReachabilityStore>> {
        let store_write = RwLockUpgradableReadGuard::upgrade(self.store_read);
        for (hash, data) in self.staging_writes {
            store_write.access.write(BatchDbWriter::new(batch), hash, Arc::new(data))?
        }
        Ok(store_write)
    }

    fn read_for_update(&mut self, hash: Hash) -> StoreResult<&mut ReachabilityData> {
        if !self.staging_writes.contains_key(&hash) {
            let data = (*self.store_read.access.read(hash)?).clone();
            self.staging_writes.insert(hash, data);
        }
        Ok(self.staging_writes.get_mut(&hash).expect("just inserted"))
    }
}

impl ReachabilityStore for StagingReachabilityStore<'_> {
    fn init_origin(&mut self, origin: Hash, capacity: Interval) -> StoreResult<()> {
        self.insert(origin, blockhash::NONE, capacity)
    }

    fn insert(&mut self, hash: Hash, parent: Hash, interval: Interval) -> StoreResult<()> {
        if self.store_read.has(hash)? {
            return Err(StoreError::KeyAlreadyExists(hash.to_string()));
        }
        if let Vacant(e) = self.staging_writes.entry(hash) {
            e.insert(ReachabilityData::new(parent, interval));
            Ok(())
        } else {
            Err(StoreError::KeyAlreadyExists(hash.to_string()))
        }
    }

    fn set_interval(&mut self, hash: Hash, interval: Interval) -> StoreResult<()> {
        self.read_for_update(hash)?.interval = interval;
        Ok(())
    }

    fn append_child(&mut self, hash: Hash, child: Hash) -> StoreResult<()> {
        let data = self.read_for_update(hash)?;
        Arc::make_mut(&mut data.children).push(child);
        Ok(())
    }

    fn insert_future_covering_item(&mut self, hash: Hash, fci: Hash, insertion_index: usize) -> StoreResult<()> {
        let data = self.read_for_update(hash)?;
        Arc::make_mut(&mut data.future_covering_set).insert(insertion_index, fci);
        Ok(())
    }
}

impl ReachabilityStoreReader for StagingReachabilityStore<'_> {
    fn has(&self, hash: Hash) -> StoreResult<bool> {
        Ok(self.staging_writes.contains_key(&hash) || self.store_read.has(hash)?)
    }

    fn get_interval(&self, hash: Hash) -> StoreResult<Interval> {
        if let Some(data) = self.staging_writes.get(&hash) {
            return Ok(data.interval);
        }
        self.store_read.get_interval(hash)
    }

    fn get_parent(&self, hash: Hash) -> StoreResult<Hash> {
        if let Some(data) = self.staging_writes.get(&hash) {
            return Ok(data.parent);
        }
        self.store_read.get_parent(hash)
    }

    fn get_children(&self, hash: Hash) -> StoreResult<BlockHashes> {
        if let Some(data) = self.staging_writes.get(&hash) {
            return Ok(BlockHashes::clone(&data.children));
        }
        self.store_read.get_children(hash)
    }

    fn get_future_covering_set(&self, hash: Hash) -> StoreResult<BlockHashes> {
        if let Some(data) = self.staging_writes.get(&hash) {
            return Ok(BlockHashes::clone(&data.future_covering_set));
        }
        self.store_read.get_future_covering_set(hash)
    }
}

/// An in-memory implementation used by reachability unit tests
#[derive(Default)]
pub struct MemoryReachabilityStore {
    map: BlockHashMap<ReachabilityData>,
}

impl MemoryReachabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_data(&self, hash: Hash) -> StoreResult<&ReachabilityData> {
        self.map.get(&hash).ok_or_else(|| StoreError::KeyNotFound(DbKey::new(StorePrefix::Reachability.as_ref(), hash)))
    }

    fn get_data_mut(&mut self, hash: Hash) -> StoreResult<&mut ReachabilityData> {
        self.map.get_mut(&hash).ok_or_else(|| StoreError::KeyNotFound(DbKey::new(StorePrefix::Reachability.as_ref(), hash)))
    }
}

impl ReachabilityStoreReader for MemoryReachabilityStore {
    fn has(&self, hash: Hash) -> StoreResult<bool> {
        Ok(self.map.contains_key(&hash))
    }

    fn get_interval(&self, hash: Hash) -> StoreResult<Interval> {
        Ok(self.get_data(hash)?.interval)
    }

    fn get_parent(&self, hash: Hash) -> StoreResult<Hash> {
        Ok(self.get_data(hash)?.parent)
    }

    fn get_children(&self, hash: Hash) -> StoreResult<BlockHashes> {
        Ok(BlockHashes::clone(&self.get_data(hash)?.children))
    }

    fn get_future_covering_set(&self, hash: Hash) -> StoreResult<BlockHashes> {
        Ok(BlockHashes::clone(&self.get_data(hash)?.future_covering_set))
    }
}

impl ReachabilityStore for MemoryReachabilityStore {
    fn init_origin(&mut self, origin: Hash, capacity: Interval) -> StoreResult<()> {
        self.insert(origin, blockhash::NONE, capacity)
    }

    fn insert(&mut self, hash: Hash, parent: Hash, interval: Interval) -> StoreResult<()> {
        if let Vacant(e) = self.map.entry(hash) {
            e.insert(ReachabilityData::new(parent, interval));
            Ok(())
        } else {
            Err(StoreError::KeyAlreadyExists(hash.to_string()))
        }
    }

    fn set_interval(&mut self, hash: Hash, interval: Interval) -> StoreResult<()> {
        self.get_data_mut(hash)?.interval = interval;
        Ok(())
    }

    fn append_child(&mut self, hash: Hash, child: Hash) -> StoreResult<()> {
        let data = self.get_data_mut(hash)?;
        Arc::make_mut(&mut data.children).push(child);
        Ok(())
    }

    fn insert_future_covering_item(&mut self, hash: Hash, fci: Hash, insertion_index: usize) -> StoreResult<()> {
        let data = self.get_data_mut(hash)?;
        Arc::make_mut(&mut data.future_covering_set).insert(insertion_index, fci);
        Ok(())
    }
}

/// Shared handle to the concurrently-accessed DB store
pub type SharedReachabilityStore = Arc<RwLock<DbReachabilityStore>>;
