use super::protocol::GhostdagManager;
use crate::model::services::reachability::ReachabilityService;
use crate::model::stores::ghostdag::GhostdagStoreReader;
use crate::model::stores::headers::HeaderStoreReader;
use crate::model::stores::relations::RelationsStoreReader;
use crate::processes::reachability::Result;
use braid_consensus_core::BlockHashSet;
use braid_hashes::Hash;
use std::collections::VecDeque;

impl<T: GhostdagStoreReader, S: RelationsStoreReader, U: ReachabilityService, V: HeaderStoreReader> GhostdagManager<T, S, U, V> {
    /// Computes the merge set of a block with the given parents: all blocks
    /// reachable from some parent but not from the selected parent, in
    /// ascending consensus order. BFS over parent edges, bounded by the
    /// selected parent's past.
    pub fn ordered_mergeset_without_selected_parent(&self, selected_parent: Hash, parents: &[Hash]) -> Result<Vec<Hash>> {
        let mut queue: VecDeque<_> = parents.iter().copied().filter(|p| p != &selected_parent).collect();
        let mut mergeset: BlockHashSet = queue.iter().copied().collect();
        let mut selected_parent_past = BlockHashSet::new();

        while let Some(current) = queue.pop_front() {
            let current_parents = self.relations_store.get_parents(current)?;

            // For each parent of the current block check whether it is in the
            // past of the selected parent. If not, add it to the merge set
            // and queue it for further processing.
            for parent in current_parents.iter().copied() {
                if mergeset.contains(&parent) || selected_parent_past.contains(&parent) {
                    continue;
                }

                if self.reachability_service.is_dag_ancestor_of(parent, selected_parent)? {
                    selected_parent_past.insert(parent);
                    continue;
                }

                mergeset.insert(parent);
                queue.push_back(parent);
            }
        }

        self.sort_blocks(mergeset.into_iter())
    }
}
