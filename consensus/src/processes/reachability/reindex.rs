use super::{tree::interval_children_capacity, ReachabilityError, Result};
use crate::model::stores::reachability::ReachabilityStore;
use braid_consensus_core::blockhash::BlockHashExtensions;
use braid_consensus_core::BlockHashMap;
use braid_hashes::Hash;
use std::collections::VecDeque;

pub(super) struct ReindexOperationContext<'a> {
    store: &'a mut dyn ReachabilityStore,
    subtree_sizes: BlockHashMap<u64>,
}

impl<'a> ReindexOperationContext<'a> {
    pub(super) fn new(store: &'a mut dyn ReachabilityStore) -> Self {
        Self { store, subtree_sizes: BlockHashMap::new() }
    }

    /// Traverses the reachability tree upwards from `new_child` until
    /// reaching a node with sufficient interval capacity for its subtree,
    /// then reallocates all intervals under that node.
    pub(super) fn reindex_intervals(&mut self, new_child: Hash) -> Result<()> {
        let mut current = new_child;
        loop {
            let current_interval = self.store.get_interval(current)?;
            self.count_subtrees(current)?;

            if current_interval.size() >= self.subtree_sizes[&current] {
                break;
            }

            let parent = self.store.get_parent(current)?;
            if parent.is_none() {
                // The tree origin is exhausted
                return Err(ReachabilityError::DataOverflow);
            }
            current = parent
        }

        self.propagate_interval(current)
    }

    /// Counts the size of each subtree under `block` into
    /// `self.subtree_sizes`. Equivalent to a postorder recursion, but
    /// implemented with a BFS queue pushing accumulated counts up parent
    /// chains, since deep linear trees would overflow the call stack.
    fn count_subtrees(&mut self, block: Hash) -> Result<()> {
        if self.subtree_sizes.contains_key(&block) {
            return Ok(());
        }

        let mut queue = VecDeque::<Hash>::from([block]);
        let mut counts = BlockHashMap::<u64>::new();

        while let Some(mut current) = queue.pop_front() {
            let children = self.store.get_children(current)?;
            if children.is_empty() {
                // We reached a leaf
                self.subtree_sizes.insert(current, 1);
            } else if !self.subtree_sizes.contains_key(&current) {
                // The subtree size of `current` is not yet known; add all its
                // children to the queue
                queue.extend(children.iter());
                continue;
            }

            // We reached a leaf or a pre-calculated subtree. Push information
            // up the parent chain.
            while current != block {
                current = self.store.get_parent(current)?;

                let count = counts.entry(current).or_insert(0);
                let children = self.store.get_children(current)?;

                *count += 1;
                if *count < children.len() as u64 {
                    // Not all subtrees of `current` are ready
                    break;
                }

                // All children of `current` have known subtree sizes
                let subtree_sum: u64 = children.iter().map(|c| self.subtree_sizes[c]).sum();
                self.subtree_sizes.insert(current, subtree_sum + 1);
            }
        }

        Ok(())
    }

    /// Propagates a new interval allocation through the subtree under
    /// `block` using a BFS traversal. Sub-intervals are allocated according
    /// to subtree sizes and the exponential splitting rule.
    fn propagate_interval(&mut self, block: Hash) -> Result<()> {
        self.count_subtrees(block)?;

        let mut queue = VecDeque::<Hash>::from([block]);
        while let Some(current) = queue.pop_front() {
            let children = self.store.get_children(current)?;
            if !children.is_empty() {
                let sizes: Vec<u64> = children.iter().map(|c| self.subtree_sizes[c]).collect();
                let capacity = interval_children_capacity(self.store, current)?;
                let intervals = capacity.split_exponential(&sizes);
                for (child, interval) in children.iter().copied().zip(intervals) {
                    self.store.set_interval(child, interval)?;
                }
                queue.extend(children.iter());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{validate_intervals, StoreBuilder};
    use super::*;
    use crate::model::stores::reachability::MemoryReachabilityStore;
    use crate::processes::reachability::interval::Interval;

    #[test]
    fn test_count_subtrees_and_propagate() {
        let mut store: Box<dyn ReachabilityStore> = Box::new(MemoryReachabilityStore::new());

        // A tree with a chain 1-2-3-5-6-8 and branches 4 (under 2) and 7 (under 1)
        let root: Hash = 1.into();
        StoreBuilder::new(store.as_mut())
            .add_block(root, Hash::ZERO)
            .add_block(2.into(), root)
            .add_block(3.into(), 2.into())
            .add_block(4.into(), 2.into())
            .add_block(5.into(), 3.into())
            .add_block(6.into(), 5.into())
            .add_block(7.into(), 1.into())
            .add_block(8.into(), 6.into());

        let mut ctx = ReindexOperationContext::new(store.as_mut());
        ctx.count_subtrees(root).unwrap();

        let expected = [(1u64, 8u64), (2, 6), (3, 4), (4, 1), (5, 3), (6, 2), (7, 1), (8, 1)]
            .iter()
            .map(|&(h, c)| (Hash::from(h), c))
            .collect::<BlockHashMap<u64>>();
        assert_eq!(expected, ctx.subtree_sizes);

        // Allocate an exactly-fitting interval and propagate it
        ctx.store.set_interval(root, Interval::new(1, 8)).unwrap();
        ctx.propagate_interval(root).unwrap();

        validate_intervals(store.as_ref(), root).unwrap();
    }
}
