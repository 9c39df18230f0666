use crate::{hashing, BlueWorkType};
use braid_hashes::Hash;
use serde::{Deserialize, Serialize};

/// An immutable block header. `blue_score`, `blue_work` and `pruning_point`
/// are declared by the miner and re-verified by consensus during header
/// processing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Cached hash of all other fields
    pub hash: Hash,
    pub version: u16,
    pub parents: Vec<Hash>,
    pub hash_merkle_root: Hash,
    pub utxo_commitment: Hash,
    /// Timestamp in milliseconds
    pub timestamp: u64,
    /// Difficulty target in compact form
    pub bits: u32,
    pub nonce: u64,
    pub blue_score: u64,
    pub blue_work: BlueWorkType,
    pub pruning_point: Hash,
}

impl Header {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: u16,
        parents: Vec<Hash>,
        hash_merkle_root: Hash,
        utxo_commitment: Hash,
        timestamp: u64,
        bits: u32,
        nonce: u64,
        blue_score: u64,
        blue_work: BlueWorkType,
        pruning_point: Hash,
    ) -> Self {
        let mut header = Self {
            hash: Hash::ZERO,
            version,
            parents,
            hash_merkle_root,
            utxo_commitment,
            timestamp,
            bits,
            nonce,
            blue_score,
            blue_work,
            pruning_point,
        };
        header.finalize();
        header
    }

    /// Recomputes the cached hash. Must be called after any field mutation
    /// (e.g. a nonce change while grinding proof-of-work).
    pub fn finalize(&mut self) {
        self.hash = hashing::header_hash(self);
    }

    pub fn direct_parents(&self) -> &[Hash] {
        &self.parents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_changes_hash() {
        let mut header = Header::new(1, vec![1.into()], Hash::ZERO, Hash::ZERO, 100, u32::MAX, 0, 0, 0, Hash::ZERO);
        let original = header.hash;
        header.nonce = 1;
        header.finalize();
        assert_ne!(original, header.hash);
    }
}
