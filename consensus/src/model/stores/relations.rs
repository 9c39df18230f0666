use braid_consensus_core::BlockHashes;
use braid_database::prelude::{BatchDbWriter, CachedDbAccess, StorePrefix, StoreError, StoreResult, DB};
use braid_hashes::Hash;
use rocksdb::WriteBatch;
use std::sync::Arc;

/// Reader API for the DAG topology: parent and child adjacency of each block.
/// Children are non-owning back-references maintained on insertion.
pub trait RelationsStoreReader {
    fn get_parents(&self, hash: Hash) -> StoreResult<BlockHashes>;
    fn get_children(&self, hash: Hash) -> StoreResult<BlockHashes>;
    fn has(&self, hash: Hash) -> StoreResult<bool>;
}

pub trait RelationsStore: RelationsStoreReader {
    /// Inserts `hash` with the given parents and registers it as a child of
    /// each of them. All parents must already exist in the store.
    fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, parents: BlockHashes) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct DbRelationsStore {
    parents_access: Arc<CachedDbAccess<Hash, BlockHashes>>,
    children_access: Arc<CachedDbAccess<Hash, BlockHashes>>,
}

impl DbRelationsStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self {
            parents_access: Arc::new(CachedDbAccess::new(Arc::clone(&db), cache_size, StorePrefix::Relations.into())),
            children_access: Arc::new(CachedDbAccess::new(db, cache_size, StorePrefix::RelationsChildren.into())),
        }
    }
}

impl RelationsStoreReader for DbRelationsStore {
    fn get_parents(&self, hash: Hash) -> StoreResult<BlockHashes> {
        self.parents_access.read(hash)
    }

    fn get_children(&self, hash: Hash) -> StoreResult<BlockHashes> {
        self.children_access.read(hash)
    }

    fn has(&self, hash: Hash) -> StoreResult<bool> {
        self.parents_access.has(hash)
    }
}

impl RelationsStore for DbRelationsStore {
    fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, parents: BlockHashes) -> StoreResult<()> {
        if self.parents_access.has(hash)? {
            return Err(StoreError::KeyAlreadyExists(hash.to_string()));
        }
        self.parents_access.write(BatchDbWriter::new(batch), hash, BlockHashes::clone(&parents))?;
        self.children_access.write(BatchDbWriter::new(batch), hash, BlockHashes::new(Vec::new()))?;
        for parent in parents.iter().copied() {
            let mut children = (*self.children_access.read(parent)?).clone();
            children.push(hash);
            self.children_access.write(BatchDbWriter::new(batch), parent, BlockHashes::new(children))?;
        }
        Ok(())
    }
}

impl<T: RelationsStoreReader> RelationsStoreReader for Arc<T> {
    fn get_parents(&self, hash: Hash) -> StoreResult<BlockHashes> {
        (**self).get_parents(hash)
    }

    fn get_children(&self, hash: Hash) -> StoreResult<BlockHashes> {
        (**self).get_children(hash)
    }

    fn has(&self, hash: Hash) -> StoreResult<bool> {
        (**self).has(hash)
    }
}

/// An in-memory implementation used by process-level unit tests
#[derive(Default)]
pub struct MemoryRelationsStore {
    parents_map: parking_lot::RwLock<braid_consensus_core::BlockHashMap<BlockHashes>>,
    children_map: parking_lot::RwLock<braid_consensus_core::BlockHashMap<Vec<Hash>>>,
}

impl MemoryRelationsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, hash: Hash, parents: BlockHashes) {
        for parent in parents.iter().copied() {
            self.children_map.write().entry(parent).or_default().push(hash);
        }
        self.children_map.write().entry(hash).or_default();
        self.parents_map.write().insert(hash, parents);
    }
}

impl RelationsStoreReader for MemoryRelationsStore {
    fn get_parents(&self, hash: Hash) -> StoreResult<BlockHashes> {
        match self.parents_map.read().get(&hash) {
            Some(parents) => Ok(BlockHashes::clone(parents)),
            None => Err(StoreError::KeyNotFound(braid_database::prelude::DbKey::new(StorePrefix::Relations.as_ref(), hash))),
        }
    }

    fn get_children(&self, hash: Hash) -> StoreResult<BlockHashes> {
        match self.children_map.read().get(&hash) {
            Some(children) => Ok(BlockHashes::new(children.clone())),
            None => Err(StoreError::KeyNotFound(braid_database::prelude::DbKey::new(StorePrefix::RelationsChildren.as_ref(), hash))),
        }
    }

    fn has(&self, hash: Hash) -> StoreResult<bool> {
        Ok(self.parents_map.read().contains_key(&hash))
    }
}
