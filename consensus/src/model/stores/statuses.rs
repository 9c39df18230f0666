use braid_consensus_core::blockstatus::BlockStatus;
use braid_database::prelude::{BatchDbWriter, CachedDbAccess, DirectDbWriter, StorePrefix, StoreResult, DB};
use braid_hashes::Hash;
use rocksdb::WriteBatch;
use std::sync::Arc;

/// Reader API for `StatusesStore`.
pub trait StatusesStoreReader {
    fn get(&self, hash: Hash) -> StoreResult<BlockStatus>;
    fn has(&self, hash: Hash) -> StoreResult<bool>;
}

/// Write API for `StatusesStore`. The set function is deliberately `mut`
/// since a status is overwritten as the block advances through validation
/// and thus needs outer guarding.
pub trait StatusesStore: StatusesStoreReader {
    fn set(&mut self, hash: Hash, status: BlockStatus) -> StoreResult<()>;
    fn set_batch(&mut self, batch: &mut WriteBatch, hash: Hash, status: BlockStatus) -> StoreResult<()>;
}

/// A DB + cache implementation of `StatusesStore` trait, with concurrent
/// readers support.
#[derive(Clone)]
pub struct DbStatusesStore {
    db: Arc<DB>,
    access: Arc<CachedDbAccess<Hash, BlockStatus>>,
}

impl DbStatusesStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: Arc::new(CachedDbAccess::new(db, cache_size, StorePrefix::Statuses.into())) }
    }
}

impl StatusesStoreReader for DbStatusesStore {
    fn get(&self, hash: Hash) -> StoreResult<BlockStatus> {
        self.access.read(hash)
    }

    fn has(&self, hash: Hash) -> StoreResult<bool> {
        self.access.has(hash)
    }
}

impl StatusesStore for DbStatusesStore {
    fn set(&mut self, hash: Hash, status: BlockStatus) -> StoreResult<()> {
        self.access.write(DirectDbWriter::new(&self.db), hash, status)
    }

    fn set_batch(&mut self, batch: &mut WriteBatch, hash: Hash, status: BlockStatus) -> StoreResult<()> {
        self.access.write(BatchDbWriter::new(batch), hash, status)
    }
}
