use crate::model::services::reachability::ReachabilityService;
use crate::model::stores::ghostdag::{CompactGhostdagData, GhostdagStoreReader};
use crate::model::stores::pruning::{PastPruningPointsStoreReader, PruningPointInfo};
use crate::processes::reachability::Result;
use braid_hashes::Hash;
use std::sync::Arc;

/// Determines the movement of the pruning point along the virtual selected
/// chain. The point advances in whole finality intervals and only to blocks
/// deeper than the pruning depth; it never regresses since candidates are
/// always taken from the chain above the current point.
#[derive(Clone)]
pub struct PruningManager<T: GhostdagStoreReader, U: ReachabilityService> {
    pruning_depth: u64,
    finality_depth: u64,
    genesis_hash: Hash,
    ghostdag_store: Arc<T>,
    reachability_service: U,
}

impl<T: GhostdagStoreReader, U: ReachabilityService> PruningManager<T, U> {
    pub fn new(
        pruning_depth: u64,
        finality_depth: u64,
        genesis_hash: Hash,
        ghostdag_store: Arc<T>,
        reachability_service: U,
    ) -> Self {
        Self { pruning_depth, finality_depth, genesis_hash, ghostdag_store, reachability_service }
    }

    /// Walks the selected chain from the current candidate towards the new
    /// virtual selected parent and returns the pruning points passed (in
    /// advancement order) together with the new candidate.
    pub fn next_pruning_points_and_candidate(
        &self,
        virtual_ghostdag_data: CompactGhostdagData,
        current_info: &PruningPointInfo,
    ) -> Result<(Vec<Hash>, Hash)> {
        let sink = virtual_ghostdag_data.selected_parent;

        // After a reorg the old candidate may sit on an abandoned branch;
        // restart the walk from the pruning point, which reorgs never cross
        let low = if self.reachability_service.is_chain_ancestor_of(current_info.candidate, sink)? {
            current_info.candidate
        } else {
            current_info.pruning_point
        };

        let mut new_pruning_points = Vec::new();
        let mut latest_pruning_point_blue_score = self.ghostdag_store.get_blue_score(current_info.pruning_point)?;
        let mut new_candidate = low;

        for selected_child in self.reachability_service.forward_chain_path(low, sink)? {
            let selected_child_blue_score = self.ghostdag_store.get_blue_score(selected_child)?;
            if virtual_ghostdag_data.blue_score - selected_child_blue_score < self.pruning_depth {
                break;
            }
            new_candidate = selected_child;
            if self.finality_score(selected_child_blue_score) > self.finality_score(latest_pruning_point_blue_score) {
                new_pruning_points.push(new_candidate);
                latest_pruning_point_blue_score = selected_child_blue_score;
            }
        }

        Ok((new_pruning_points, new_candidate))
    }

    /// The number of finality intervals passed by the given blue score
    fn finality_score(&self, blue_score: u64) -> u64 {
        blue_score / self.finality_depth
    }

    /// A header must declare a pruning point this node has moved through
    /// (or the current one). Blocks shallower than the pruning depth declare
    /// genesis.
    pub fn is_valid_header_pruning_point(
        &self,
        declared: Hash,
        info: &PruningPointInfo,
        past_pruning_points: &impl PastPruningPointsStoreReader,
    ) -> Result<bool> {
        if declared == info.pruning_point || declared == self.genesis_hash {
            return Ok(true);
        }
        for index in (0..=info.index).rev() {
            if past_pruning_points.get(index)? == declared {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
