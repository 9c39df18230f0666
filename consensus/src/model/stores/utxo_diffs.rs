use braid_consensus_core::utxo::utxo_diff::UtxoDiff;
use braid_database::prelude::{BatchDbWriter, CachedDbAccess, StorePrefix, StoreError, StoreResult, DB};
use braid_hashes::Hash;
use rocksdb::WriteBatch;
use std::sync::Arc;

/// Store for the UTXO difference of a chain block relative to its selected
/// parent state. Computed lazily only for blocks that become selected-chain
/// candidates; a block with status `UtxoValid` always has an entry here.
/// Entries behind the pruning point are garbage collected.
pub trait UtxoDiffsStoreReader {
    fn get(&self, hash: Hash) -> StoreResult<Arc<UtxoDiff>>;
    fn has(&self, hash: Hash) -> StoreResult<bool>;
}

pub trait UtxoDiffsStore: UtxoDiffsStoreReader {
    fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, utxo_diff: Arc<UtxoDiff>) -> StoreResult<()>;
    fn delete_batch(&self, batch: &mut WriteBatch, hash: Hash) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct DbUtxoDiffsStore {
    access: Arc<CachedDbAccess<Hash, Arc<UtxoDiff>>>,
}

impl DbUtxoDiffsStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { access: Arc::new(CachedDbAccess::new(db, cache_size, StorePrefix::UtxoDiffs.into())) }
    }
}

impl UtxoDiffsStoreReader for DbUtxoDiffsStore {
    fn get(&self, hash: Hash) -> StoreResult<Arc<UtxoDiff>> {
        self.access.read(hash)
    }

    fn has(&self, hash: Hash) -> StoreResult<bool> {
        self.access.has(hash)
    }
}

impl UtxoDiffsStore for DbUtxoDiffsStore {
    fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, utxo_diff: Arc<UtxoDiff>) -> StoreResult<()> {
        if self.access.has(hash)? {
            return Err(StoreError::KeyAlreadyExists(hash.to_string()));
        }
        self.access.write(BatchDbWriter::new(batch), hash, utxo_diff)
    }

    fn delete_batch(&self, batch: &mut WriteBatch, hash: Hash) -> StoreResult<()> {
        self.access.delete(BatchDbWriter::new(batch), hash)
    }
}
