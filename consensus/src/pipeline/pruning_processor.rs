use crate::consensus::storage::ConsensusStorage;
use crate::errors::{ConsensusError, ConsensusResult};
use crate::model::services::reachability::ReachabilityService;
use crate::model::stores::block_transactions::{BlockTransactionsStore, BlockTransactionsStoreReader};
use crate::model::stores::ghostdag::CompactGhostdagData;
use crate::model::stores::pruning::{PastPruningPointsStore, PruningStore, PruningStoreReader};
use crate::model::stores::relations::RelationsStoreReader;
use crate::model::stores::utxo_diffs::{UtxoDiffsStore, UtxoDiffsStoreReader};
use crate::pipeline::{DbPruningManager, DbReachabilityService};
use braid_consensus_core::events::ConsensusEvent;
use braid_consensus_core::BlockHashSet;
use braid_database::prelude::StoreError;
use braid_hashes::Hash;
use rocksdb::WriteBatch;
use std::collections::VecDeque;
use std::sync::Arc;

/// Advances the pruning point after virtual updates and garbage-collects
/// history behind it: block bodies and chain UTXO diffs are deleted, while
/// headers, GHOSTDAG data and reachability labels are retained so ordering
/// queries over pruned ancestors keep working.
pub struct PruningProcessor {
    storage: Arc<ConsensusStorage>,
    pruning_manager: DbPruningManager,
    reachability_service: DbReachabilityService,
}

impl PruningProcessor {
    pub fn new(storage: Arc<ConsensusStorage>, pruning_manager: DbPruningManager, reachability_service: DbReachabilityService) -> Self {
        Self { storage, pruning_manager, reachability_service }
    }

    /// Checks whether the pruning point can advance given the new virtual
    /// state and stages the advancement (pruning info, past points, retained
    /// UTXO-set commitment, garbage collection) into `batch`
    pub fn advance_pruning_point(
        &self,
        virtual_ghostdag_data: CompactGhostdagData,
        batch: &mut WriteBatch,
    ) -> ConsensusResult<Vec<ConsensusEvent>> {
        let pruning_read = self.storage.pruning_store.upgradable_read();
        let mut info = pruning_read.get()?;
        let previous_point = info.pruning_point;

        let (new_pruning_points, new_candidate) =
            self.pruning_manager.next_pruning_points_and_candidate(virtual_ghostdag_data, &info)?;

        if new_pruning_points.is_empty() && new_candidate == info.candidate {
            return Ok(Vec::new());
        }

        let pruning_write = parking_lot::RwLockUpgradableReadGuard::upgrade(pruning_read);
        for new_point in new_pruning_points.iter().copied() {
            // Monotonicity: the new point must extend the chain of the old one
            if !self.reachability_service.is_chain_ancestor_of(info.pruning_point, new_point)? {
                return Err(ConsensusError::InvariantViolation(format!(
                    "pruning point {} does not descend from {}",
                    new_point, info.pruning_point
                )));
            }

            // Advance the retained UTXO commitment by the chain diffs between
            // the two points; this is the proof kept for bootstrapping
            for chain_block in self.reachability_service.forward_chain_path(info.pruning_point, new_point)? {
                let diff = self.storage.utxo_diffs_store.get(chain_block)?;
                info.utxo_commitment.apply_diff(diff.as_ref());
            }

            info.index += 1;
            info.pruning_point = new_point;
            self.storage.past_pruning_points_store.insert_batch(batch, info.index, new_point)?;
        }
        info.candidate = new_candidate;
        pruning_write.set_batch(batch, info)?;
        drop(pruning_write);

        let mut events = Vec::new();
        if info.pruning_point != previous_point {
            log::info!("pruning point moved from {} to {}", previous_point, info.pruning_point);
            events.push(ConsensusEvent::PruningPointMoved { previous: previous_point, current: info.pruning_point });
            self.collect_pruned_data(info.pruning_point, batch)?;
        }
        Ok(events)
    }

    /// Deletes bodies and UTXO diffs strictly in the past of the new pruning
    /// point. The traversal walks parent edges and stops at blocks already
    /// collected (no body and no diff), which bounds each round to the newly
    /// prunable region.
    fn collect_pruned_data(&self, pruning_point: Hash, batch: &mut WriteBatch) -> ConsensusResult<()> {
        let mut queue: VecDeque<Hash> = VecDeque::from([pruning_point]);
        let mut visited: BlockHashSet = BlockHashSet::from_iter([pruning_point]);
        let mut pruned_count = 0usize;

        while let Some(current) = queue.pop_front() {
            for parent in self.storage.relations_store.get_parents(current)?.iter().copied() {
                if !visited.insert(parent) {
                    continue;
                }
                let has_body = self.storage.block_transactions_store.has(parent)?;
                let has_diff = match self.storage.utxo_diffs_store.has(parent) {
                    Ok(present) => present,
                    Err(StoreError::KeyNotFound(_)) => false,
                    Err(err) => return Err(err.into()),
                };
                if !has_body && !has_diff {
                    continue;
                }
                if has_body {
                    self.storage.block_transactions_store.delete_batch(batch, parent)?;
                }
                if has_diff {
                    self.storage.utxo_diffs_store.delete_batch(batch, parent)?;
                }
                pruned_count += 1;
                queue.push_back(parent);
            }
        }

        if pruned_count > 0 {
            log::debug!("garbage-collected bodies/diffs of {} blocks behind the pruning point", pruned_count);
        }
        Ok(())
    }
}
