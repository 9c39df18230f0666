use super::{interval::Interval, tree::add_tree_block, ReachabilityError, Result};
use crate::model::stores::reachability::{ReachabilityStore, ReachabilityStoreReader};
use braid_hashes::Hash;

/// Initializes the reachability tree with the synthetic origin node owning
/// the maximal interval. Idempotent.
pub fn init(store: &mut dyn ReachabilityStore, origin: Hash) -> Result<()> {
    if store.has(origin)? {
        return Ok(());
    }
    store.init_origin(origin, Interval::maximal())?;
    Ok(())
}

/// Adds a block to the reachability structures: a tree edge under its
/// selected parent (reindexing intervals if needed) and a future-covering
/// registration for every merge-set block it newly reaches.
pub fn add_block(store: &mut dyn ReachabilityStore, new_block: Hash, selected_parent: Hash, mergeset: &[Hash]) -> Result<()> {
    add_tree_block(store, new_block, selected_parent)?;
    for merged_block in mergeset.iter().copied() {
        insert_to_future_covering_set(store, merged_block, new_block)?;
    }
    Ok(())
}

/// Is `anchor` a chain ancestor of `queried` (i.e. on its selected-parent
/// path)? Inclusive: a block is a chain ancestor of itself.
pub fn is_chain_ancestor_of(store: &(impl ReachabilityStoreReader + ?Sized), anchor: Hash, queried: Hash) -> Result<bool> {
    Ok(store.get_interval(anchor)?.contains(store.get_interval(queried)?))
}

/// Is `anchor` a DAG ancestor of `queried` (reachable through any parent
/// edges)? Inclusive. Chain containment resolves selected-parent paths; the
/// future covering set resolves merge edges.
pub fn is_dag_ancestor_of(store: &(impl ReachabilityStoreReader + ?Sized), anchor: Hash, queried: Hash) -> Result<bool> {
    if is_chain_ancestor_of(store, anchor, queried)? {
        return Ok(true);
    }
    let fcs = store.get_future_covering_set(anchor)?;
    Ok(binary_search_descendant(store, &fcs, queried)?.is_some())
}

/// Returns the child of `ancestor` on the tree path toward `descendant`.
/// `ancestor` must be a strict chain ancestor of `descendant`.
pub fn get_next_chain_ancestor(store: &(impl ReachabilityStoreReader + ?Sized), descendant: Hash, ancestor: Hash) -> Result<Hash> {
    let children = store.get_children(ancestor)?;
    match binary_search_descendant(store, &children, descendant)? {
        Some(child) => Ok(child),
        None => Err(ReachabilityError::BadQuery),
    }
}

/// Walks up the selected-parent tree from `from` and returns the deepest
/// block which is a chain ancestor of both `from` and `other`
pub fn common_chain_ancestor(store: &(impl ReachabilityStoreReader + ?Sized), from: Hash, other: Hash) -> Result<Hash> {
    let mut current = from;
    loop {
        if is_chain_ancestor_of(store, current, other)? {
            return Ok(current);
        }
        current = store.get_parent(current)?;
    }
}

fn insert_to_future_covering_set(store: &mut dyn ReachabilityStore, merged_block: Hash, new_block: Hash) -> Result<()> {
    let fcs = store.get_future_covering_set(merged_block)?;
    match search_position(store, &fcs, new_block)? {
        SearchPosition::Covered(_) => Ok(()),
        SearchPosition::Insert(index) => store.insert_future_covering_item(merged_block, new_block, index).map_err(Into::into),
    }
}

enum SearchPosition {
    /// The item at the contained index is a chain ancestor of the queried block
    Covered(usize),
    Insert(usize),
}

/// Binary-searches an interval-ordered list for the position of `queried`.
/// List items hold pairwise disjoint intervals, so containment is decidable
/// by probing the greatest item starting at or before `queried`.
fn search_position(store: &(impl ReachabilityStoreReader + ?Sized), list: &[Hash], queried: Hash) -> Result<SearchPosition> {
    let queried_interval = store.get_interval(queried)?;
    let mut lo = 0usize;
    let mut hi = list.len();
    while lo < hi {
        let mid = (lo + hi) / 2;
        if store.get_interval(list[mid])?.start <= queried_interval.start {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    if lo > 0 && store.get_interval(list[lo - 1])?.contains(queried_interval) {
        return Ok(SearchPosition::Covered(lo - 1));
    }
    Ok(SearchPosition::Insert(lo))
}

/// Searches an interval-ordered list for an item which is a chain ancestor
/// of `queried`
fn binary_search_descendant(
    store: &(impl ReachabilityStoreReader + ?Sized),
    list: &[Hash],
    queried: Hash,
) -> Result<Option<Hash>> {
    match search_position(store, list, queried)? {
        SearchPosition::Covered(index) => Ok(Some(list[index])),
        SearchPosition::Insert(_) => Ok(None),
    }
}
