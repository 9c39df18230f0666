use braid_consensus_core::BlueWorkType;
use braid_hashes::Hash;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A block key under the canonical consensus order: ascending blue work,
/// ties broken by ascending hash. Every ordering decision in the engine
/// reduces to comparing these keys.
#[derive(Eq, Clone, Serialize, Deserialize)]
pub struct SortableBlock {
    pub hash: Hash,
    pub blue_work: BlueWorkType,
}

impl SortableBlock {
    pub fn new(hash: Hash, blue_work: BlueWorkType) -> Self {
        Self { hash, blue_work }
    }
}

impl PartialEq for SortableBlock {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.blue_work == other.blue_work
    }
}

impl PartialOrd for SortableBlock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortableBlock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.blue_work.cmp(&other.blue_work).then_with(|| self.hash.cmp(&other.hash))
    }
}
