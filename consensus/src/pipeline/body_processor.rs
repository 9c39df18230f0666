use crate::consensus::storage::ConsensusStorage;
use crate::errors::{BlockProcessResult, RuleError};
use crate::model::stores::block_transactions::BlockTransactionsStore;
use crate::model::stores::statuses::StatusesStore;
use crate::model::stores::tips::TipsStore;
use crate::processes::transaction_validator::{block_mass, TransactionValidator};
use braid_consensus_core::block::Block;
use braid_consensus_core::blockstatus::BlockStatus;
use braid_consensus_core::merkle::calc_merkle_root;
use braid_consensus_core::BlockHashSet;
use rocksdb::WriteBatch;
use std::sync::Arc;

/// Validates block bodies in isolation (no UTXO context) and commits them.
/// UTXO-contextual verification is deferred to the virtual processor, which
/// runs it when the block becomes a chain candidate.
pub struct BodyProcessor {
    max_block_mass: u64,
    transaction_validator: TransactionValidator,
    storage: Arc<ConsensusStorage>,
}

impl BodyProcessor {
    pub fn new(max_block_mass: u64, transaction_validator: TransactionValidator, storage: Arc<ConsensusStorage>) -> Self {
        Self { max_block_mass, transaction_validator, storage }
    }

    pub fn validate_body_in_isolation(&self, block: &Block) -> BlockProcessResult<()> {
        let transactions = &block.transactions;
        if transactions.is_empty() {
            return Err(RuleError::NoTransactions);
        }
        if !transactions[0].is_coinbase() {
            return Err(RuleError::FirstTxNotCoinbase);
        }
        for (position, tx) in transactions.iter().enumerate().skip(1) {
            if tx.is_coinbase() {
                return Err(RuleError::MultipleCoinbases(position));
            }
        }

        let merkle_root = calc_merkle_root(transactions.iter().map(|tx| tx.id()));
        if merkle_root != block.header.hash_merkle_root {
            return Err(RuleError::BadMerkleRoot { got: block.header.hash_merkle_root, expected: merkle_root });
        }

        let mut ids = BlockHashSet::with_capacity(transactions.len());
        for tx in transactions.iter() {
            if !ids.insert(tx.id()) {
                return Err(RuleError::DuplicateTransactions(tx.id()));
            }
            self.transaction_validator.validate_tx_in_isolation(tx)?;
        }

        // No intra-block double spends across transactions
        let mut spent = std::collections::HashSet::new();
        for tx in transactions.iter() {
            for input in tx.inputs.iter() {
                if !spent.insert(input.previous_outpoint) {
                    return Err(RuleError::DoubleSpendInBlock(tx.id(), input.previous_outpoint));
                }
            }
        }

        let mass = block_mass(transactions);
        if mass > self.max_block_mass {
            return Err(RuleError::ExceedsMassLimit(mass, self.max_block_mass));
        }

        Ok(())
    }

    /// Persists the body, advances the status to pending-UTXO-verification
    /// and registers the block as a DAG tip
    pub fn commit_body(&self, batch: &mut WriteBatch, block: &Block) -> crate::errors::ConsensusResult<()> {
        let hash = block.hash();
        self.storage.block_transactions_store.insert_batch(batch, hash, Arc::clone(&block.transactions))?;
        self.storage.statuses_store.write().set_batch(batch, hash, BlockStatus::UtxoPendingVerification)?;
        self.storage.tips_store.write().add_tip_batch(batch, hash, block.header.direct_parents())?;
        Ok(())
    }
}
