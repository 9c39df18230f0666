use crate::model::stores::reachability::ReachabilityStoreReader;
use crate::processes::reachability::{inquirer, Result};
use braid_hashes::Hash;
use parking_lot::RwLock;
use std::sync::Arc;

/// A multi-threaded reachability query service: takes a fine-grained read
/// lock per query so readers never block behind the acceptance writer for
/// longer than a single store access.
pub trait ReachabilityService {
    fn is_chain_ancestor_of(&self, anchor: Hash, queried: Hash) -> Result<bool>;
    fn is_dag_ancestor_of(&self, anchor: Hash, queried: Hash) -> Result<bool>;
    fn is_dag_ancestor_of_any(&self, anchor: Hash, queried: &mut impl Iterator<Item = Hash>) -> Result<bool>;
    /// The deepest block which is a chain ancestor of both arguments
    fn common_chain_ancestor(&self, from: Hash, other: Hash) -> Result<Hash>;
    /// The chain path from `from` (exclusive) up to `to` (inclusive),
    /// in ascending chain order. `from` must be a chain ancestor of `to`.
    fn forward_chain_path(&self, from: Hash, to: Hash) -> Result<Vec<Hash>>;
    /// The chain path from `from` (inclusive) down to `to` (exclusive),
    /// in descending chain order. `to` must be a chain ancestor of `from`.
    fn backward_chain_path(&self, from: Hash, to: Hash) -> Result<Vec<Hash>>;
}

pub struct MTReachabilityService<T: ReachabilityStoreReader> {
    store: Arc<RwLock<T>>,
}

impl<T: ReachabilityStoreReader> Clone for MTReachabilityService<T> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<T: ReachabilityStoreReader> MTReachabilityService<T> {
    pub fn new(store: Arc<RwLock<T>>) -> Self {
        Self { store }
    }
}

impl<T: ReachabilityStoreReader> ReachabilityService for MTReachabilityService<T> {
    fn is_chain_ancestor_of(&self, anchor: Hash, queried: Hash) -> Result<bool> {
        let read_guard = self.store.read();
        inquirer::is_chain_ancestor_of(&*read_guard, anchor, queried)
    }

    fn is_dag_ancestor_of(&self, anchor: Hash, queried: Hash) -> Result<bool> {
        let read_guard = self.store.read();
        inquirer::is_dag_ancestor_of(&*read_guard, anchor, queried)
    }

    fn is_dag_ancestor_of_any(&self, anchor: Hash, queried: &mut impl Iterator<Item = Hash>) -> Result<bool> {
        let read_guard = self.store.read();
        for hash in queried {
            if inquirer::is_dag_ancestor_of(&*read_guard, anchor, hash)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn common_chain_ancestor(&self, from: Hash, other: Hash) -> Result<Hash> {
        let read_guard = self.store.read();
        inquirer::common_chain_ancestor(&*read_guard, from, other)
    }

    fn forward_chain_path(&self, from: Hash, to: Hash) -> Result<Vec<Hash>> {
        let read_guard = self.store.read();
        let mut path = Vec::new();
        let mut current = from;
        while current != to {
            current = inquirer::get_next_chain_ancestor(&*read_guard, to, current)?;
            path.push(current);
        }
        Ok(path)
    }

    fn backward_chain_path(&self, from: Hash, to: Hash) -> Result<Vec<Hash>> {
        let read_guard = self.store.read();
        let mut path = Vec::new();
        let mut current = from;
        while current != to {
            path.push(current);
            current = read_guard.get_parent(current)?;
        }
        Ok(path)
    }
}
