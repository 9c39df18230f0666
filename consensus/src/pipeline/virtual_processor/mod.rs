mod utxo_validation;

use crate::consensus::storage::ConsensusStorage;
use crate::errors::{ConsensusError, ConsensusResult, RuleError};
use crate::model::services::reachability::ReachabilityService;
use crate::model::stores::ghostdag::{DbGhostdagStore, GhostdagStoreReader};
use crate::model::stores::headers::{DbHeadersStore, HeaderStoreReader};
use crate::model::stores::pruning::PruningStoreReader;
use crate::model::stores::statuses::{StatusesStore, StatusesStoreReader};
use crate::model::stores::tips::TipsStoreReader;
use crate::model::stores::utxo_diffs::{UtxoDiffsStore, UtxoDiffsStoreReader};
use crate::model::stores::utxo_set::UtxoSetStore;
use crate::model::stores::virtual_state::{DbVirtualStateStore, VirtualState, VirtualStateStore, VirtualStateStoreReader};
use crate::params::Params;
use crate::pipeline::{DbGhostdagManager, DbReachabilityService};
use crate::processes::difficulty::DifficultyManager;
use crate::processes::finality::FinalityManager;
use crate::processes::ghostdag::ordering::SortableBlock;
use crate::processes::ghostdag::protocol::prefer_as_selected_parent;
use crate::processes::past_median_time::PastMedianTimeManager;
use crate::processes::transaction_validator::TransactionValidator;
use crate::processes::window::WindowManager;
use braid_consensus_core::blockstatus::BlockStatus;
use braid_consensus_core::events::ConsensusEvent;
use braid_consensus_core::utxo::commitment::UtxoCommitment;
use braid_consensus_core::utxo::utxo_diff::UtxoDiff;
use braid_database::prelude::StoreResult;
use braid_hashes::Hash;
use rocksdb::WriteBatch;
use std::sync::Arc;

/// Maintains the virtual block: the synthetic merger of all current tips.
/// Owns the selected-sink decision, chain-block UTXO verification, reorg
/// unwinding and the materialized virtual UTXO set. All methods that stage
/// writes are called with the acceptance lock held.
pub struct VirtualStateProcessor {
    max_virtual_parents: usize,
    difficulty_window_size: usize,
    past_median_time_window_size: usize,
    pub(super) coinbase_subsidy: u64,

    pub(super) storage: Arc<ConsensusStorage>,
    ghostdag_manager: DbGhostdagManager,
    window_manager: WindowManager<DbGhostdagStore>,
    difficulty_manager: DifficultyManager<DbHeadersStore>,
    past_median_time_manager: PastMedianTimeManager<DbHeadersStore>,
    finality_manager: FinalityManager<DbGhostdagStore>,
    reachability_service: DbReachabilityService,
    pub(super) transaction_validator: TransactionValidator,
}

/// The outcome of one virtual resolution round
pub struct VirtualResolveOutcome {
    pub new_state: Arc<VirtualState>,
    pub events: Vec<ConsensusEvent>,
    /// Set when the submitted block itself was disqualified during chain
    /// verification, so the caller can surface the precise rule violation
    pub submitted_block_rule_error: Option<RuleError>,
}

enum SinkAdoption {
    Adopted { state: Arc<VirtualState>, removed: Vec<Hash>, added: Vec<Hash> },
    Disqualified { block: Hash, error: RuleError },
}

impl VirtualStateProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: &Params,
        storage: Arc<ConsensusStorage>,
        ghostdag_manager: DbGhostdagManager,
        window_manager: WindowManager<DbGhostdagStore>,
        difficulty_manager: DifficultyManager<DbHeadersStore>,
        past_median_time_manager: PastMedianTimeManager<DbHeadersStore>,
        finality_manager: FinalityManager<DbGhostdagStore>,
        reachability_service: DbReachabilityService,
        transaction_validator: TransactionValidator,
    ) -> Self {
        Self {
            max_virtual_parents: params.max_virtual_parents,
            difficulty_window_size: params.difficulty_window_size,
            past_median_time_window_size: params.past_median_time_window_size,
            coinbase_subsidy: params.coinbase_subsidy,
            storage,
            ghostdag_manager,
            window_manager,
            difficulty_manager,
            past_median_time_manager,
            finality_manager,
            reachability_service,
            transaction_validator,
        }
    }

    pub fn virtual_state_store(&self) -> &DbVirtualStateStore {
        &self.storage.virtual_state_store
    }

    /// Recomputes the virtual after `submitted_block` entered the DAG.
    /// Iterates sink candidates by selected-parent preference, verifying
    /// candidate chains lazily; adopts the best candidate whose whole chain
    /// is UTXO valid and which respects the finality point. The previous
    /// sink serves as the always-valid fallback, so the virtual never moves
    /// backwards. All changes are staged into `batch`; nothing is published
    /// until the caller commits it.
    pub fn resolve_virtual(&self, submitted_block: Hash, batch: &mut WriteBatch) -> ConsensusResult<VirtualResolveOutcome> {
        let prev_state = self.storage.virtual_state_store.get()?;
        let prev_sink = prev_state.selected_parent();
        let tips_set = self.storage.tips_store.read().get()?;

        let mut tips: Vec<SortableBlock> = tips_set
            .iter()
            .map(|tip| Ok(SortableBlock::new(*tip, self.storage.ghostdag_store.get_blue_work(*tip)?)))
            .collect::<StoreResult<_>>()?;
        tips.sort_unstable_by(|a, b| {
            if prefer_as_selected_parent(a, b) {
                std::cmp::Ordering::Less
            } else if prefer_as_selected_parent(b, a) {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        });

        let finality_point = self.finality_manager.finality_point(&prev_state.ghostdag_data.to_compact())?;
        let mut events = Vec::new();
        let mut submitted_block_rule_error = None;

        let fallback = (!tips_set.contains(&prev_sink)).then_some(prev_sink);
        let candidates: Vec<Hash> = tips.iter().map(|tip| tip.hash).chain(fallback).collect();

        for sink_candidate in candidates {
            let status = self.storage.statuses_store.read().get(sink_candidate)?;
            if !status.is_utxo_valid_or_pending() {
                continue;
            }

            if sink_candidate != prev_sink && !self.reachability_service.is_chain_ancestor_of(finality_point, sink_candidate)? {
                log::warn!(
                    "finality conflict: candidate chain {} excludes the finality point {}",
                    sink_candidate,
                    finality_point
                );
                events.push(ConsensusEvent::FinalityConflict { violating_block: sink_candidate, finality_point });
                continue;
            }

            match self.try_adopt_sink(sink_candidate, &prev_state, &tips, batch)? {
                SinkAdoption::Adopted { state, removed, added } => {
                    self.storage.virtual_state_store.set_batch(batch, Arc::clone(&state))?;
                    if !removed.is_empty() || !added.is_empty() {
                        events.push(ConsensusEvent::VirtualChainChanged { removed, added });
                    }
                    return Ok(VirtualResolveOutcome { new_state: state, events, submitted_block_rule_error });
                }
                SinkAdoption::Disqualified { block, error } => {
                    log::warn!("block {} disqualified from chain: {}", block, error);
                    self.storage.statuses_store.write().set_batch(batch, block, BlockStatus::DisqualifiedFromChain)?;
                    if block == submitted_block {
                        submitted_block_rule_error = Some(error);
                    }
                    continue;
                }
            }
        }

        Err(ConsensusError::InvariantViolation("virtual resolution found no adoptable sink".into()))
    }

    /// Attempts to move the virtual onto `sink`. Walks the chain transition
    /// from the previous sink (unwind to the split point, reapply forward),
    /// verifying not-yet-verified chain blocks on the way.
    fn try_adopt_sink(
        &self,
        sink: Hash,
        prev_state: &VirtualState,
        sorted_tips: &[SortableBlock],
        batch: &mut WriteBatch,
    ) -> ConsensusResult<SinkAdoption> {
        let prev_sink = prev_state.selected_parent();

        // Revert the virtual-over-sink diff: state now tracks the previous
        // sink. The commitment toggles cancel symmetrically.
        let mut accumulated = prev_state.sink_diff.clone().to_reversed();
        let mut commitment = prev_state.utxo_commitment;
        commitment.apply_diff(&accumulated);

        let split = self.reachability_service.common_chain_ancestor(prev_sink, sink)?;

        let removed = self.reachability_service.backward_chain_path(prev_sink, split)?;
        for block in removed.iter().copied() {
            let diff = self.storage.utxo_diffs_store.get(block)?;
            commitment.apply_diff(&diff.as_reversed());
            accumulated
                .with_diff_in_place(&diff.as_reversed())
                .map_err(|err| ConsensusError::InvariantViolation(err.to_string()))?;
        }

        let added = self.reachability_service.forward_chain_path(split, sink)?;
        for block in added.iter().copied() {
            let status = self.storage.statuses_store.read().get(block)?;
            if status == BlockStatus::UtxoValid {
                let diff = self.storage.utxo_diffs_store.get(block)?;
                commitment.apply_diff(diff.as_ref());
                accumulated
                    .with_diff_in_place(diff.as_ref())
                    .map_err(|err| ConsensusError::InvariantViolation(err.to_string()))?;
                continue;
            }

            let block_ghostdag_data = self.storage.ghostdag_store.get_data(block)?;
            let header = self.storage.headers_store.get_header(block)?;
            match self.verify_and_build_chain_block_diff(&header, &block_ghostdag_data, &accumulated, commitment) {
                Ok((block_diff, new_commitment)) => {
                    self.storage.utxo_diffs_store.insert_batch(batch, block, Arc::new(block_diff.clone()))?;
                    self.storage.statuses_store.write().set_batch(batch, block, BlockStatus::UtxoValid)?;
                    accumulated
                        .with_diff_in_place(&block_diff)
                        .map_err(|err| ConsensusError::InvariantViolation(err.to_string()))?;
                    commitment = new_commitment;
                }
                Err(ConsensusError::Rule(rule_error)) => return Ok(SinkAdoption::Disqualified { block, error: rule_error }),
                Err(other) => return Err(other),
            }
        }

        // Sink state reached; rebuild the virtual on top of it
        let parents = self.select_virtual_parents(sink, sorted_tips)?;
        let virtual_ghostdag_data = self.ghostdag_manager.ghostdag(&parents)?;
        debug_assert_eq!(virtual_ghostdag_data.selected_parent, sink);

        let (sink_diff, utxo_commitment, _fees) =
            self.calculate_mergeset_acceptance(&virtual_ghostdag_data, &accumulated, commitment)?;
        accumulated.with_diff_in_place(&sink_diff).map_err(|err| ConsensusError::InvariantViolation(err.to_string()))?;
        self.storage.virtual_utxo_store.write_diff_batch(batch, &accumulated)?;

        let median_window = self.window_manager.blue_window(&virtual_ghostdag_data, self.past_median_time_window_size)?;
        let past_median_time = self.past_median_time_manager.calc_past_median_time(&median_window)?;
        let difficulty_window = self.window_manager.blue_window(&virtual_ghostdag_data, self.difficulty_window_size)?;
        let bits = self.difficulty_manager.expected_difficulty_bits(&difficulty_window)?;

        let state = Arc::new(VirtualState {
            parents,
            ghostdag_data: virtual_ghostdag_data,
            past_median_time,
            bits,
            sink_diff,
            utxo_commitment,
        });
        Ok(SinkAdoption::Adopted { state, removed, added })
    }

    /// The virtual parent set: the sink first, then the best remaining tips
    /// which are mergeable (valid-or-pending and not preferred over the
    /// sink), bounded by the configured maximum
    fn select_virtual_parents(&self, sink: Hash, sorted_tips: &[SortableBlock]) -> ConsensusResult<Vec<Hash>> {
        let sink_key = SortableBlock::new(sink, self.storage.ghostdag_store.get_blue_work(sink)?);
        let mut parents = vec![sink];
        for tip in sorted_tips.iter() {
            if parents.len() == self.max_virtual_parents {
                break;
            }
            if tip.hash == sink || prefer_as_selected_parent(tip, &sink_key) {
                continue;
            }
            if !self.storage.statuses_store.read().get(tip.hash)?.is_utxo_valid_or_pending() {
                continue;
            }
            parents.push(tip.hash);
        }
        Ok(parents)
    }

    /// The current finality point, computed against the live virtual state
    pub fn finality_point(&self) -> ConsensusResult<Hash> {
        let state = self.storage.virtual_state_store.get()?;
        Ok(self.finality_manager.finality_point(&state.ghostdag_data.to_compact())?)
    }

    /// Bootstraps the virtual state over a fresh genesis-only DAG
    pub fn init_virtual_state(&self, batch: &mut WriteBatch, genesis_hash: Hash) -> ConsensusResult<Arc<VirtualState>> {
        let parents = vec![genesis_hash];
        let virtual_ghostdag_data = self.ghostdag_manager.ghostdag(&parents)?;
        let (sink_diff, utxo_commitment, _fees) =
            self.calculate_mergeset_acceptance(&virtual_ghostdag_data, &UtxoDiff::default(), UtxoCommitment::EMPTY)?;
        self.storage.virtual_utxo_store.write_diff_batch(batch, &sink_diff)?;

        let genesis_header = self.storage.headers_store.get_header(genesis_hash)?;
        let state = Arc::new(VirtualState {
            parents,
            ghostdag_data: virtual_ghostdag_data,
            past_median_time: genesis_header.timestamp,
            bits: genesis_header.bits,
            sink_diff,
            utxo_commitment,
        });
        self.storage.virtual_state_store.set_batch(batch, Arc::clone(&state))?;
        Ok(state)
    }

    pub(crate) fn pruning_point(&self) -> ConsensusResult<Hash> {
        Ok(self.storage.pruning_store.read().pruning_point()?)
    }
}
