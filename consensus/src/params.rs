use crate::constants::BLOCK_VERSION;
use braid_consensus_core::block::Block;
use braid_consensus_core::header::Header;
use braid_consensus_core::tx::{ScriptPublicKey, Transaction, TransactionOutput};
use braid_consensus_core::KType;
use braid_hashes::Hash;

/// Everything needed to reconstruct the genesis block of a network
#[derive(Clone, Debug)]
pub struct GenesisConfig {
    pub timestamp: u64,
    pub bits: u32,
    pub nonce: u64,
    pub coinbase_payload: &'static [u8],
}

/// Consensus parameters of a network. Protocol constants (k, depths, bounds)
/// are configuration validated against known-good block sequences, not
/// hardcoded in the algorithms.
#[derive(Clone, Debug)]
pub struct Params {
    pub genesis: GenesisConfig,
    pub ghostdag_k: KType,
    pub max_block_parents: usize,
    pub mergeset_size_limit: u64,
    pub merge_depth_bound: u64,
    pub difficulty_window_size: usize,
    /// Below this window length the genesis difficulty is kept
    pub min_difficulty_window_size: usize,
    pub past_median_time_window_size: usize,
    pub target_time_per_block_ms: u64,
    pub timestamp_deviation_tolerance_ms: u64,
    pub max_block_mass: u64,
    pub coinbase_maturity: u64,
    pub coinbase_subsidy: u64,
    pub pruning_depth: u64,
    pub finality_depth: u64,
    pub max_virtual_parents: usize,
}

impl Params {
    /// Builds the genesis block deterministically from the genesis config.
    /// Genesis has no parents, an empty UTXO commitment and declares zero
    /// blue score and work.
    pub fn build_genesis(&self) -> Block {
        let coinbase = Transaction::new(
            Vec::new(),
            vec![TransactionOutput::new(self.coinbase_subsidy, ScriptPublicKey::hash_lock(self.genesis.coinbase_payload))],
            0,
            self.genesis.coinbase_payload.to_vec(),
        );
        let header = Header::new(
            BLOCK_VERSION,
            Vec::new(),
            braid_consensus_core::merkle::calc_merkle_root(std::iter::once(coinbase.id())),
            Hash::ZERO,
            self.genesis.timestamp,
            self.genesis.bits,
            self.genesis.nonce,
            0,
            0,
            Hash::ZERO,
        );
        Block::new(header, vec![coinbase])
    }
}

pub const MAINNET_PARAMS: Params = Params {
    genesis: GenesisConfig {
        timestamp: 1_755_000_000_000,
        bits: 0x0cffffff,
        nonce: 0x3a9c_e1b4,
        coinbase_payload: b"braid-mainnet-genesis",
    },
    ghostdag_k: 18,
    max_block_parents: 16,
    mergeset_size_limit: 180,
    merge_depth_bound: 3600,
    difficulty_window_size: 2641,
    min_difficulty_window_size: 1000,
    past_median_time_window_size: 263,
    target_time_per_block_ms: 1000,
    timestamp_deviation_tolerance_ms: 132_000,
    max_block_mass: 500_000,
    coinbase_maturity: 100,
    coinbase_subsidy: 50_000_000_000,
    pruning_depth: 185_798,
    finality_depth: 86_400,
    max_virtual_parents: 64,
};

/// Small-scale parameters for simulation and tests: trivial difficulty,
/// shallow depths so pruning and finality are exercised quickly.
pub const SIMNET_PARAMS: Params = Params {
    genesis: GenesisConfig {
        timestamp: 1_755_000_000_000,
        bits: simnet_genesis_bits(),
        nonce: 0,
        coinbase_payload: b"braid-simnet-genesis",
    },
    ghostdag_k: 4,
    max_block_parents: 8,
    mergeset_size_limit: 36,
    merge_depth_bound: 1000,
    difficulty_window_size: 40,
    min_difficulty_window_size: 80,
    past_median_time_window_size: 11,
    target_time_per_block_ms: 1000,
    timestamp_deviation_tolerance_ms: u64::MAX / 4,
    max_block_mass: 500_000,
    coinbase_maturity: 10,
    coinbase_subsidy: 50_000_000_000,
    pruning_depth: 12,
    finality_depth: 6,
    max_virtual_parents: 8,
};

const fn simnet_genesis_bits() -> u32 {
    // target_to_compact(MAX_TARGET) is not const; the encoding of the
    // maximal target is fixed, assert it in tests instead
    0x10ffffff
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_consensus_core::difficulty::{target_to_compact, MAX_TARGET};

    #[test]
    fn test_simnet_bits_encode_max_target() {
        assert_eq!(simnet_genesis_bits(), target_to_compact(MAX_TARGET));
    }

    #[test]
    fn test_genesis_determinism() {
        let a = SIMNET_PARAMS.build_genesis();
        let b = SIMNET_PARAMS.build_genesis();
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), MAINNET_PARAMS.build_genesis().hash());
        assert!(a.transactions[0].is_coinbase());
    }
}
