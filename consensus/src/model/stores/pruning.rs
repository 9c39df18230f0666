use braid_consensus_core::utxo::commitment::UtxoCommitment;
use braid_database::prelude::{BatchDbWriter, CachedDbAccess, CachedDbItem, StorePrefix, StoreResult, DB};
use braid_hashes::Hash;
use rocksdb::WriteBatch;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The current pruning state: the pruning point, the candidate that may
/// become the next point, a running index numbering every past pruning point,
/// and the commitment to the UTXO set at the point (the proof retained when
/// history behind it is discarded).
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct PruningPointInfo {
    pub pruning_point: Hash,
    pub candidate: Hash,
    pub index: u64,
    pub utxo_commitment: UtxoCommitment,
}

impl PruningPointInfo {
    pub fn from_genesis(genesis_hash: Hash, utxo_commitment: UtxoCommitment) -> Self {
        Self { pruning_point: genesis_hash, candidate: genesis_hash, index: 0, utxo_commitment }
    }
}

pub trait PruningStoreReader {
    fn get(&self) -> StoreResult<PruningPointInfo>;
    fn pruning_point(&self) -> StoreResult<Hash>;
}

pub trait PruningStore: PruningStoreReader {
    fn set_batch(&self, batch: &mut WriteBatch, info: PruningPointInfo) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct DbPruningStore {
    access: Arc<CachedDbItem<PruningPointInfo>>,
}

impl DbPruningStore {
    pub fn new(db: Arc<DB>) -> Self {
        Self { access: Arc::new(CachedDbItem::new(db, StorePrefix::PruningPoint.into())) }
    }

    pub fn is_initialized(&self) -> bool {
        self.access.read().is_ok()
    }
}

impl PruningStoreReader for DbPruningStore {
    fn get(&self) -> StoreResult<PruningPointInfo> {
        self.access.read()
    }

    fn pruning_point(&self) -> StoreResult<Hash> {
        Ok(self.access.read()?.pruning_point)
    }
}

impl PruningStore for DbPruningStore {
    fn set_batch(&self, batch: &mut WriteBatch, info: PruningPointInfo) -> StoreResult<()> {
        self.access.write(BatchDbWriter::new(batch), &info)
    }
}

/// Big-endian index key so iteration order follows pruning history
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PruningPointIndexKey([u8; 8]);

impl From<u64> for PruningPointIndexKey {
    fn from(index: u64) -> Self {
        Self(index.to_be_bytes())
    }
}

impl AsRef<[u8]> for PruningPointIndexKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

pub trait PastPruningPointsStoreReader {
    fn get(&self, index: u64) -> StoreResult<Hash>;
}

pub trait PastPruningPointsStore: PastPruningPointsStoreReader {
    fn insert_batch(&self, batch: &mut WriteBatch, index: u64, pruning_point: Hash) -> StoreResult<()>;
}

/// Every pruning point the node ever moved through, indexed by advancement
/// order. Together with retained headers this forms the header-chain part of
/// the pruning proof.
#[derive(Clone)]
pub struct DbPastPruningPointsStore {
    access: Arc<CachedDbAccess<PruningPointIndexKey, Hash>>,
}

impl DbPastPruningPointsStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { access: Arc::new(CachedDbAccess::new(db, cache_size, StorePrefix::PastPruningPoints.into())) }
    }
}

impl PastPruningPointsStoreReader for DbPastPruningPointsStore {
    fn get(&self, index: u64) -> StoreResult<Hash> {
        self.access.read(index.into())
    }
}

impl PastPruningPointsStore for DbPastPruningPointsStore {
    fn insert_batch(&self, batch: &mut WriteBatch, index: u64, pruning_point: Hash) -> StoreResult<()> {
        self.access.write(BatchDbWriter::new(batch), index.into(), pruning_point)
    }
}
