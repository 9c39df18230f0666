//!
//! Tree-related functions internal to the module
//!
use super::{interval::Interval, reindex::ReindexOperationContext, Result};
use crate::model::stores::reachability::ReachabilityStore;
use braid_hashes::Hash;

/// The sub-interval of a node available for carving out children intervals.
/// The node keeps its own `end` point, so children are strictly contained.
pub fn interval_children_capacity(store: &dyn ReachabilityStore, block: Hash) -> Result<Interval> {
    let interval = store.get_interval(block)?;
    Ok(Interval::new(interval.start, interval.end.saturating_sub(1)))
}

/// The capacity of `block` remaining after its currently allocated children.
/// Children are allocated in insertion order from the capacity start, so the
/// remainder is everything after the last child.
pub fn interval_remaining_after(store: &dyn ReachabilityStore, block: Hash) -> Result<Interval> {
    let capacity = interval_children_capacity(store, block)?;
    match store.get_children(block)?.last() {
        Some(last_child) => {
            let last_end = store.get_interval(*last_child)?.end;
            Ok(Interval::new(last_end + 1, capacity.end))
        }
        None => Ok(capacity),
    }
}

pub fn add_tree_block(store: &mut dyn ReachabilityStore, new_block: Hash, parent: Hash) -> Result<()> {
    let remaining = interval_remaining_after(store, parent)?;
    store.append_child(parent, new_block)?;
    if remaining.is_empty() {
        // Insert with the empty interval positioned exactly at the end of the
        // current capacity; the reindex below will allocate a real one
        store.insert(new_block, parent, remaining)?;
        let mut ctx = ReindexOperationContext::new(store);
        ctx.reindex_intervals(new_block)?;
    } else {
        let allocated = remaining.split_half().0;
        store.insert(new_block, parent, allocated)?;
    };
    Ok(())
}
