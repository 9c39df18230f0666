use braid_consensus_core::header::Header;
use braid_database::prelude::{BatchDbWriter, CachedDbAccess, StorePrefix, StoreResult, DB};
use braid_hashes::Hash;
use rocksdb::WriteBatch;
use std::sync::Arc;

pub trait HeaderStoreReader {
    fn get_header(&self, hash: Hash) -> StoreResult<Arc<Header>>;
    fn get_timestamp(&self, hash: Hash) -> StoreResult<u64>;
    fn get_bits(&self, hash: Hash) -> StoreResult<u32>;
    fn has(&self, hash: Hash) -> StoreResult<bool>;
}

pub trait HeaderStore: HeaderStoreReader {
    fn insert_batch(&self, batch: &mut WriteBatch, header: Arc<Header>) -> StoreResult<()>;
}

/// A DB + cache implementation of `HeaderStore`. Headers are append-only and
/// retained forever (pruning removes bodies, never headers).
#[derive(Clone)]
pub struct DbHeadersStore {
    access: Arc<CachedDbAccess<Hash, Arc<Header>>>,
}

impl DbHeadersStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { access: Arc::new(CachedDbAccess::new(db, cache_size, StorePrefix::Headers.into())) }
    }
}

impl HeaderStoreReader for DbHeadersStore {
    fn get_header(&self, hash: Hash) -> StoreResult<Arc<Header>> {
        self.access.read(hash)
    }

    fn get_timestamp(&self, hash: Hash) -> StoreResult<u64> {
        Ok(self.access.read(hash)?.timestamp)
    }

    fn get_bits(&self, hash: Hash) -> StoreResult<u32> {
        Ok(self.access.read(hash)?.bits)
    }

    fn has(&self, hash: Hash) -> StoreResult<bool> {
        self.access.has(hash)
    }
}

impl HeaderStore for DbHeadersStore {
    fn insert_batch(&self, batch: &mut WriteBatch, header: Arc<Header>) -> StoreResult<()> {
        self.access.write(BatchDbWriter::new(batch), header.hash, header)
    }
}

/// An in-memory implementation used by process-level unit tests
#[derive(Default)]
pub struct MemoryHeadersStore {
    map: parking_lot::RwLock<braid_consensus_core::BlockHashMap<Arc<Header>>>,
}

impl MemoryHeadersStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, header: Arc<Header>) {
        self.map.write().insert(header.hash, header);
    }

    fn read(&self, hash: Hash) -> StoreResult<Arc<Header>> {
        self.map.read().get(&hash).cloned().ok_or_else(|| {
            braid_database::prelude::StoreError::KeyNotFound(braid_database::prelude::DbKey::new(StorePrefix::Headers.as_ref(), hash))
        })
    }
}

impl HeaderStoreReader for MemoryHeadersStore {
    fn get_header(&self, hash: Hash) -> StoreResult<Arc<Header>> {
        self.read(hash)
    }

    fn get_timestamp(&self, hash: Hash) -> StoreResult<u64> {
        Ok(self.read(hash)?.timestamp)
    }

    fn get_bits(&self, hash: Hash) -> StoreResult<u32> {
        Ok(self.read(hash)?.bits)
    }

    fn has(&self, hash: Hash) -> StoreResult<bool> {
        Ok(self.map.read().contains_key(&hash))
    }
}
