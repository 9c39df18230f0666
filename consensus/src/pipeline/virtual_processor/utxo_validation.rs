use super::VirtualStateProcessor;
use crate::errors::{BlockProcessResult, ConsensusError, ConsensusResult, RuleError};
use crate::model::stores::block_transactions::BlockTransactionsStoreReader;
use crate::model::stores::ghostdag::{GhostdagData, GhostdagStoreReader};
use braid_consensus_core::header::Header;
use braid_consensus_core::tx::{PopulatedTransaction, Transaction, UtxoEntry, ValidatedTransaction};
use braid_consensus_core::utxo::commitment::UtxoCommitment;
use braid_consensus_core::utxo::utxo_diff::UtxoDiff;
use braid_consensus_core::utxo::utxo_view::UtxoView;
use braid_hashes::Hash;
use rayon::prelude::*;

impl VirtualStateProcessor {
    /// Folds the acceptance set of a point-of-view block (a chain block or
    /// the virtual) into a UTXO diff relative to its selected parent state:
    /// the selected parent's coinbase mints first, then the selected
    /// parent's other transactions, then each further merge-set block's
    /// transactions in ascending consensus order. A merged transaction
    /// which conflicts with an earlier one in this order (or is otherwise
    /// invalid in context) is simply not accepted. Returns the diff, the
    /// advanced commitment and the total accepted fees.
    pub(super) fn calculate_mergeset_acceptance(
        &self,
        pov_ghostdag_data: &GhostdagData,
        base_diff: &UtxoDiff,
        base_commitment: UtxoCommitment,
    ) -> ConsensusResult<(UtxoDiff, UtxoCommitment, u64)> {
        let pov_blue_score = pov_ghostdag_data.blue_score;
        let selected_parent = pov_ghostdag_data.selected_parent;
        let mut mergeset_diff = UtxoDiff::default();
        let mut total_fees = 0u64;

        let mut merged_blocks = vec![selected_parent];
        merged_blocks.extend(
            pov_ghostdag_data.ascending_mergeset_without_selected_parent(self.storage.ghostdag_store.as_ref()).map(|sb| sb.hash),
        );

        for (position, merged) in merged_blocks.iter().copied().enumerate() {
            let transactions = self.storage.block_transactions_store.get(merged)?;

            if position == 0 {
                // Only chain-block coinbases ever mint: the selected parent's
                // coinbase is accepted here, by its chain successor
                let validated_coinbase = ValidatedTransaction::new_coinbase(&transactions[0]);
                mergeset_diff
                    .add_transaction(&validated_coinbase, pov_blue_score)
                    .map_err(|err| ConsensusError::InvariantViolation(err.to_string()))?;
            }

            let composed_view = self.storage.virtual_utxo_store.compose(base_diff).compose(&mergeset_diff);
            let validated_transactions = self.validate_transactions_in_parallel(&transactions, &composed_view, pov_blue_score);
            for validated_tx in validated_transactions {
                mergeset_diff
                    .add_transaction(&validated_tx, pov_blue_score)
                    .map_err(|err| ConsensusError::InvariantViolation(err.to_string()))?;
                total_fees += validated_tx.calculated_fee;
            }
        }

        let mut commitment = base_commitment;
        commitment.apply_diff(&mergeset_diff);
        Ok((mergeset_diff, commitment, total_fees))
    }

    /// Verifies a candidate chain block against its own UTXO view and builds
    /// its diff: the declared UTXO commitment must match the computed one,
    /// the coinbase payout must stay within subsidy plus accepted fees, and
    /// every one of the block's own transactions must be valid in the
    /// merge-set-consistent view. Any failure disqualifies the block from
    /// the chain.
    pub(super) fn verify_and_build_chain_block_diff(
        &self,
        header: &Header,
        block_ghostdag_data: &GhostdagData,
        base_diff: &UtxoDiff,
        base_commitment: UtxoCommitment,
    ) -> ConsensusResult<(UtxoDiff, UtxoCommitment)> {
        let (mergeset_diff, commitment, total_fees) =
            self.calculate_mergeset_acceptance(block_ghostdag_data, base_diff, base_commitment)?;

        let expected_commitment = commitment.finalize();
        if expected_commitment != header.utxo_commitment {
            return Err(ConsensusError::Rule(RuleError::BadUtxoCommitment {
                got: header.utxo_commitment,
                expected: expected_commitment,
            }));
        }

        let own_transactions = self.storage.block_transactions_store.get(header.hash)?;

        let coinbase_payout: u64 = own_transactions[0].outputs.iter().map(|output| output.value).sum();
        let allowed_payout = self.coinbase_subsidy + total_fees;
        if coinbase_payout > allowed_payout {
            return Err(ConsensusError::Rule(RuleError::BadCoinbasePayout { got: coinbase_payout, allowed: allowed_payout }));
        }

        // The block's own transactions are validated against its view but do
        // not extend its diff; they are accepted by its chain successor
        let own_view = self.storage.virtual_utxo_store.compose(base_diff).compose(&mergeset_diff);
        let validated = self.validate_transactions_in_parallel(&own_transactions, &own_view, block_ghostdag_data.blue_score);
        if validated.len() < own_transactions.len() - 1 {
            // Re-run sequentially to surface the exact failing rule
            for tx in own_transactions.iter().skip(1) {
                self.populate_and_validate(tx, &own_view, block_ghostdag_data.blue_score)?;
            }
            return Err(ConsensusError::InvariantViolation("parallel and sequential validation disagree".into()));
        }

        Ok((mergeset_diff, commitment))
    }

    /// Validates transactions against the provided view in parallel and
    /// returns those which passed. The coinbase at position 0 is skipped.
    pub(super) fn validate_transactions_in_parallel<'a, V: UtxoView + Sync>(
        &self,
        transactions: &'a [Transaction],
        utxo_view: &V,
        pov_blue_score: u64,
    ) -> Vec<ValidatedTransaction<'a>> {
        transactions
            .par_iter()
            .skip(1)
            .filter_map(|tx| match self.populate_and_validate(tx, utxo_view, pov_blue_score) {
                Ok(validated_tx) => Some(validated_tx),
                Err(rule_error) => {
                    log::trace!("tx {} not accepted in utxo context: {}", tx.id(), rule_error);
                    None
                }
            })
            .collect()
    }

    fn populate_and_validate<'a>(
        &self,
        transaction: &'a Transaction,
        utxo_view: &impl UtxoView,
        pov_blue_score: u64,
    ) -> BlockProcessResult<ValidatedTransaction<'a>> {
        let mut entries: Vec<UtxoEntry> = Vec::with_capacity(transaction.inputs.len());
        for input in transaction.inputs.iter() {
            match utxo_view.get(&input.previous_outpoint) {
                Some(entry) => entries.push(entry),
                None => return Err(RuleError::MissingTxOutpoint(transaction.id(), input.previous_outpoint)),
            }
        }
        let populated_tx = PopulatedTransaction::new(transaction, entries);
        let calculated_fee = self.transaction_validator.validate_populated_transaction_and_get_fee(&populated_tx, pov_blue_score)?;
        Ok(ValidatedTransaction::new(populated_tx, calculated_fee))
    }

    /// Computes, without staging any writes, the UTXO commitment a block
    /// with the given GHOSTDAG data must declare. Used for building block
    /// templates on arbitrary parent sets.
    pub fn preview_utxo_commitment(&self, pov_ghostdag_data: &GhostdagData) -> ConsensusResult<Hash> {
        let prev_state = self.storage.virtual_state_store.get()?;
        let (base_diff, base_commitment) = self.read_only_state_at(pov_ghostdag_data.selected_parent, &prev_state)?;
        let (_, commitment, _) = self.calculate_mergeset_acceptance(pov_ghostdag_data, &base_diff, base_commitment)?;
        Ok(commitment.finalize())
    }

    /// Rolls the materialized virtual state back/forward (in memory only) to
    /// the UTXO state of the given chain target. Diffs missing along the
    /// target chain (blocks never verified as chain blocks) are computed on
    /// the fly without being persisted.
    fn read_only_state_at(
        &self,
        target: Hash,
        prev_state: &crate::model::stores::virtual_state::VirtualState,
    ) -> ConsensusResult<(UtxoDiff, UtxoCommitment)> {
        use crate::model::services::reachability::ReachabilityService;
        use crate::model::stores::utxo_diffs::UtxoDiffsStoreReader;
        use braid_database::prelude::StoreError;

        let prev_sink = prev_state.selected_parent();
        let mut accumulated = prev_state.sink_diff.clone().to_reversed();
        let mut commitment = prev_state.utxo_commitment;
        commitment.apply_diff(&accumulated);

        let split = self.reachability_service.common_chain_ancestor(prev_sink, target)?;
        for block in self.reachability_service.backward_chain_path(prev_sink, split)? {
            let diff = self.storage.utxo_diffs_store.get(block)?;
            commitment.apply_diff(&diff.as_reversed());
            accumulated
                .with_diff_in_place(&diff.as_reversed())
                .map_err(|err| ConsensusError::InvariantViolation(err.to_string()))?;
        }
        for block in self.reachability_service.forward_chain_path(split, target)? {
            let stored_diff = match self.storage.utxo_diffs_store.get(block) {
                Ok(diff) => Some(diff),
                Err(StoreError::KeyNotFound(_)) => None,
                Err(err) => return Err(err.into()),
            };
            match stored_diff {
                Some(diff) => {
                    commitment.apply_diff(diff.as_ref());
                    accumulated
                        .with_diff_in_place(diff.as_ref())
                        .map_err(|err| ConsensusError::InvariantViolation(err.to_string()))?;
                }
                None => {
                    let block_ghostdag_data = self.storage.ghostdag_store.get_data(block)?;
                    let (block_diff, advanced_commitment, _) =
                        self.calculate_mergeset_acceptance(&block_ghostdag_data, &accumulated, commitment)?;
                    commitment = advanced_commitment;
                    accumulated
                        .with_diff_in_place(&block_diff)
                        .map_err(|err| ConsensusError::InvariantViolation(err.to_string()))?;
                }
            }
        }
        Ok((accumulated, commitment))
    }
}
