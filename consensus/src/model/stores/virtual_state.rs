use crate::model::stores::ghostdag::GhostdagData;
use braid_consensus_core::utxo::commitment::UtxoCommitment;
use braid_consensus_core::utxo::utxo_diff::UtxoDiff;
use braid_database::prelude::{BatchDbWriter, CachedDbItem, StorePrefix, StoreResult, DB};
use braid_hashes::Hash;
use rocksdb::WriteBatch;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The full state of the virtual block: its (bounded) parent set, GHOSTDAG
/// data, the expected difficulty and median time for a block mined on top of
/// it, and the diff between its selected parent's UTXO state and its own.
#[derive(Clone, Serialize, Deserialize)]
pub struct VirtualState {
    pub parents: Vec<Hash>,
    pub ghostdag_data: GhostdagData,
    pub past_median_time: u64,
    pub bits: u32,
    /// Diff from the selected parent (sink) UTXO state to the virtual state
    pub sink_diff: UtxoDiff,
    /// Commitment to the virtual UTXO set
    pub utxo_commitment: UtxoCommitment,
}

impl VirtualState {
    pub fn selected_parent(&self) -> Hash {
        self.ghostdag_data.selected_parent
    }
}

pub trait VirtualStateStoreReader {
    fn get(&self) -> StoreResult<Arc<VirtualState>>;
}

pub trait VirtualStateStore: VirtualStateStoreReader {
    fn set_batch(&self, batch: &mut WriteBatch, state: Arc<VirtualState>) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct DbVirtualStateStore {
    access: Arc<CachedDbItem<Arc<VirtualState>>>,
}

impl DbVirtualStateStore {
    pub fn new(db: Arc<DB>) -> Self {
        Self { access: Arc::new(CachedDbItem::new(db, StorePrefix::VirtualState.into())) }
    }

    pub fn is_initialized(&self) -> bool {
        self.access.read().is_ok()
    }
}

impl VirtualStateStoreReader for DbVirtualStateStore {
    fn get(&self) -> StoreResult<Arc<VirtualState>> {
        self.access.read()
    }
}

impl VirtualStateStore for DbVirtualStateStore {
    fn set_batch(&self, batch: &mut WriteBatch, state: Arc<VirtualState>) -> StoreResult<()> {
        self.access.write(BatchDbWriter::new(batch), &state)
    }
}
