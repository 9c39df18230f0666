use braid_consensus_core::tx::Transaction;
use braid_database::prelude::{BatchDbWriter, CachedDbAccess, StorePrefix, StoreError, StoreResult, DB};
use braid_hashes::Hash;
use rocksdb::WriteBatch;
use std::sync::Arc;

pub trait BlockTransactionsStoreReader {
    fn get(&self, hash: Hash) -> StoreResult<Arc<Vec<Transaction>>>;
    fn has(&self, hash: Hash) -> StoreResult<bool>;
}

pub trait BlockTransactionsStore: BlockTransactionsStoreReader {
    fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, transactions: Arc<Vec<Transaction>>) -> StoreResult<()>;
    /// Deletes the block body; used by pruning garbage collection
    fn delete_batch(&self, batch: &mut WriteBatch, hash: Hash) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct DbBlockTransactionsStore {
    access: Arc<CachedDbAccess<Hash, Arc<Vec<Transaction>>>>,
}

impl DbBlockTransactionsStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { access: Arc::new(CachedDbAccess::new(db, cache_size, StorePrefix::BlockTransactions.into())) }
    }
}

impl BlockTransactionsStoreReader for DbBlockTransactionsStore {
    fn get(&self, hash: Hash) -> StoreResult<Arc<Vec<Transaction>>> {
        self.access.read(hash)
    }

    fn has(&self, hash: Hash) -> StoreResult<bool> {
        self.access.has(hash)
    }
}

impl BlockTransactionsStore for DbBlockTransactionsStore {
    fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, transactions: Arc<Vec<Transaction>>) -> StoreResult<()> {
        if self.access.has(hash)? {
            return Err(StoreError::KeyAlreadyExists(hash.to_string()));
        }
        self.access.write(BatchDbWriter::new(batch), hash, transactions)
    }

    fn delete_batch(&self, batch: &mut WriteBatch, hash: Hash) -> StoreResult<()> {
        self.access.delete(BatchDbWriter::new(batch), hash)
    }
}
