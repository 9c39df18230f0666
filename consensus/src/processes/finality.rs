use crate::model::stores::ghostdag::{CompactGhostdagData, GhostdagStoreReader};
use braid_consensus_core::blockhash;
use braid_database::prelude::StoreResult;
use braid_hashes::Hash;
use std::sync::Arc;

/// Computes the finality point: the most recent chain block whose blue-score
/// depth below the virtual reaches the finality depth. Chains excluding it
/// are assumed economically infeasible and raise a conflict alarm.
#[derive(Clone)]
pub struct FinalityManager<T: GhostdagStoreReader> {
    finality_depth: u64,
    genesis_hash: Hash,
    ghostdag_store: Arc<T>,
}

impl<T: GhostdagStoreReader> FinalityManager<T> {
    pub fn new(finality_depth: u64, genesis_hash: Hash, ghostdag_store: Arc<T>) -> Self {
        Self { finality_depth, genesis_hash, ghostdag_store }
    }

    /// Walks the selected-parent chain down from the virtual sink. Falls
    /// back to genesis while the chain is shallower than the finality depth.
    pub fn finality_point(&self, virtual_ghostdag_data: &CompactGhostdagData) -> StoreResult<Hash> {
        let virtual_blue_score = virtual_ghostdag_data.blue_score;
        let mut current = virtual_ghostdag_data.selected_parent;
        loop {
            if current == self.genesis_hash {
                return Ok(current);
            }
            let data = self.ghostdag_store.get_compact_data(current)?;
            if virtual_blue_score - data.blue_score >= self.finality_depth {
                return Ok(current);
            }
            if data.selected_parent == blockhash::NONE {
                return Ok(current);
            }
            current = data.selected_parent;
        }
    }
}
