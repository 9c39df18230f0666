//!
//! A self-contained consensus harness over a temporary database, used by
//! integration tests and simulations. Builds valid blocks (including the
//! declared ordering fields, UTXO commitments and trivial proof-of-work) on
//! arbitrary parent sets.
//!
use super::Consensus;
use crate::constants::BLOCK_VERSION;
use crate::errors::ConsensusResult;
use crate::model::stores::headers::HeaderStoreReader;
use crate::params::{Params, SIMNET_PARAMS};
use braid_consensus_core::block::Block;
use braid_consensus_core::blockstatus::BlockStatus;
use braid_consensus_core::difficulty::check_pow;
use braid_consensus_core::header::Header;
use braid_consensus_core::merkle::calc_merkle_root;
use braid_consensus_core::tx::{ScriptPublicKey, Transaction, TransactionInput, TransactionOutpoint, TransactionOutput};
use braid_database::prelude::create_temp_db;
use braid_hashes::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestConsensus {
    consensus: Arc<Consensus>,
    params: Params,
    /// Strictly increasing tie-breaker making sibling blocks over identical
    /// parents distinct
    clock: AtomicU64,
    // Destroys the database directory when the harness is dropped
    _db_guard: TempDir,
}

impl TestConsensus {
    pub fn new_with_params(params: Params) -> Self {
        let (db_guard, db) = create_temp_db();
        let consensus = Consensus::new(db, params.clone()).expect("consensus creation over a temp db");
        Self { consensus, params, clock: AtomicU64::new(0), _db_guard: db_guard }
    }

    /// A harness over the small-scale simnet parameters (trivial difficulty,
    /// shallow pruning/finality depths)
    pub fn new_simnet() -> Self {
        Self::new_with_params(SIMNET_PARAMS.clone())
    }

    pub fn consensus(&self) -> &Arc<Consensus> {
        &self.consensus
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn genesis_hash(&self) -> Hash {
        self.consensus.genesis_hash()
    }

    /// Builds a fully valid block over the given parents: declared GHOSTDAG
    /// fields and UTXO commitment are computed the way validation recomputes
    /// them, and the nonce is ground until the proof-of-work passes.
    pub fn build_block_with_parents(&self, parents: Vec<Hash>, txs: Vec<Transaction>) -> ConsensusResult<Block> {
        let ghostdag_data = self.consensus.ghostdag_manager.ghostdag(&parents)?;
        let utxo_commitment = self.consensus.virtual_processor.preview_utxo_commitment(&ghostdag_data)?;

        let mut timestamp = 0u64;
        for parent in parents.iter().copied() {
            timestamp = timestamp.max(self.consensus.storage.headers_store.get_timestamp(parent)?);
        }
        timestamp += self.params.target_time_per_block_ms + self.clock.fetch_add(1, Ordering::Relaxed);

        // The payload binds the coinbase to its DAG position so coinbases of
        // distinct blocks never share a transaction id (and hence never
        // collide on outpoints)
        let mut coinbase_payload = Vec::with_capacity(parents.len() * 32 + 8);
        for parent in parents.iter() {
            coinbase_payload.extend_from_slice(parent.as_bytes());
        }
        coinbase_payload.extend_from_slice(&ghostdag_data.blue_score.to_le_bytes());
        let coinbase = Transaction::new(
            Vec::new(),
            vec![TransactionOutput::new(self.params.coinbase_subsidy, ScriptPublicKey::hash_lock(b"test-miner"))],
            0,
            coinbase_payload,
        );
        let mut transactions = vec![coinbase];
        transactions.extend(txs);

        let mut header = Header::new(
            BLOCK_VERSION,
            parents,
            calc_merkle_root(transactions.iter().map(|tx| tx.id())),
            utxo_commitment,
            timestamp,
            self.params.genesis.bits,
            0,
            ghostdag_data.blue_score,
            ghostdag_data.blue_work,
            self.consensus.pruning_point()?,
        );
        while !check_pow(header.hash, header.bits) {
            header.nonce += 1;
            header.finalize();
        }
        Ok(Block::new(header, transactions))
    }

    /// Builds and submits an empty block over the given parents
    pub fn add_block_with_parents(&self, parents: Vec<Hash>) -> ConsensusResult<(Hash, BlockStatus)> {
        self.add_block_with_parents_and_txs(parents, Vec::new())
    }

    pub fn add_block_with_parents_and_txs(&self, parents: Vec<Hash>, txs: Vec<Transaction>) -> ConsensusResult<(Hash, BlockStatus)> {
        let block = self.build_block_with_parents(parents, txs)?;
        let hash = block.hash();
        let status = self.consensus.submit_block(block)?;
        Ok((hash, status))
    }

    /// Extends the virtual selected chain by `count` empty blocks and
    /// returns the new chain tip
    pub fn extend_virtual_chain(&self, count: usize) -> ConsensusResult<Hash> {
        let mut tip = self.consensus.virtual_selected_parent();
        for _ in 0..count {
            (tip, _) = self.add_block_with_parents(vec![tip])?;
        }
        Ok(tip)
    }

    /// A transaction spending a single hash-locked outpoint
    pub fn build_tx(&self, outpoint: TransactionOutpoint, unlock: &[u8], outputs: Vec<TransactionOutput>) -> Transaction {
        Transaction::new(vec![TransactionInput::new(outpoint, unlock.to_vec())], outputs, 0, Vec::new())
    }
}
