use crate::constants::BLOCK_VERSION;
use crate::errors::{BlockProcessResult, ConsensusError, ConsensusResult, RuleError};
use crate::model::services::reachability::ReachabilityService;
use crate::model::stores::ghostdag::{GhostdagData, GhostdagStore, GhostdagStoreReader};
use crate::model::stores::headers::HeaderStore;
use crate::model::stores::pruning::PruningStoreReader;
use crate::model::stores::reachability::StagingReachabilityStore;
use crate::model::stores::relations::RelationsStore;
use crate::model::stores::statuses::{StatusesStore, StatusesStoreReader};
use crate::params::Params;
use crate::processes::difficulty::DifficultyManager;
use crate::processes::past_median_time::PastMedianTimeManager;
use crate::processes::reachability::inquirer as reachability;
use crate::processes::window::WindowManager;
use crate::{consensus::storage::ConsensusStorage, pipeline::{DbGhostdagManager, DbPruningManager, DbReachabilityService}};
use braid_consensus_core::blockstatus::BlockStatus;
use braid_consensus_core::difficulty;
use braid_consensus_core::header::Header;
use braid_consensus_core::BlockHashes;
use braid_hashes::Hash;
use rocksdb::WriteBatch;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Validates headers through the staged pipeline: context-free checks, parent
/// availability, proof-of-work, then (under the acceptance lock) GHOSTDAG
/// verification and contextual rules, ending in a single-batch commit of all
/// header-related stores.
pub struct HeaderProcessor {
    max_block_parents: usize,
    mergeset_size_limit: u64,
    merge_depth_bound: u64,
    timestamp_deviation_tolerance_ms: u64,
    difficulty_window_size: usize,
    past_median_time_window_size: usize,

    storage: Arc<ConsensusStorage>,
    ghostdag_manager: DbGhostdagManager,
    window_manager: WindowManager<crate::model::stores::ghostdag::DbGhostdagStore>,
    difficulty_manager: DifficultyManager<crate::model::stores::headers::DbHeadersStore>,
    past_median_time_manager: PastMedianTimeManager<crate::model::stores::headers::DbHeadersStore>,
    pruning_manager: DbPruningManager,
    reachability_service: DbReachabilityService,
}

impl HeaderProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: &Params,
        storage: Arc<ConsensusStorage>,
        ghostdag_manager: DbGhostdagManager,
        window_manager: WindowManager<crate::model::stores::ghostdag::DbGhostdagStore>,
        difficulty_manager: DifficultyManager<crate::model::stores::headers::DbHeadersStore>,
        past_median_time_manager: PastMedianTimeManager<crate::model::stores::headers::DbHeadersStore>,
        pruning_manager: DbPruningManager,
        reachability_service: DbReachabilityService,
    ) -> Self {
        Self {
            max_block_parents: params.max_block_parents,
            mergeset_size_limit: params.mergeset_size_limit,
            merge_depth_bound: params.merge_depth_bound,
            timestamp_deviation_tolerance_ms: params.timestamp_deviation_tolerance_ms,
            difficulty_window_size: params.difficulty_window_size,
            past_median_time_window_size: params.past_median_time_window_size,
            storage,
            ghostdag_manager,
            window_manager,
            difficulty_manager,
            past_median_time_manager,
            pruning_manager,
            reachability_service,
        }
    }

    /// Context-free structural checks. Failures here cause rejection without
    /// any state change.
    pub fn validate_header_in_isolation(&self, header: &Header) -> BlockProcessResult<()> {
        if header.version != BLOCK_VERSION {
            return Err(RuleError::WrongBlockVersion(header.version));
        }
        if header.direct_parents().is_empty() {
            return Err(RuleError::NoParents);
        }
        if header.direct_parents().len() > self.max_block_parents {
            return Err(RuleError::TooManyParents(header.direct_parents().len(), self.max_block_parents));
        }
        if difficulty::compact_to_target(header.bits).is_none() {
            return Err(RuleError::InvalidDifficultyBits(header.bits));
        }
        let now_ms = unix_now_ms();
        let max_allowed = now_ms.saturating_add(self.timestamp_deviation_tolerance_ms);
        if header.timestamp > max_allowed {
            return Err(RuleError::TimeTooFarIntoTheFuture(header.timestamp, max_allowed));
        }
        Ok(())
    }

    /// Parents must all be known. A known-invalid parent poisons this block
    /// immediately, skipping all remaining validation. Bodied processing also
    /// requires parent bodies, deferring otherwise.
    pub fn check_parents(&self, header: &Header, require_parent_bodies: bool) -> ConsensusResult<()> {
        let statuses_read = self.storage.statuses_store.read();
        let mut missing = Vec::new();
        for parent in header.direct_parents().iter().copied() {
            if !statuses_read.has(parent)? {
                missing.push(parent);
                continue;
            }
            let status = statuses_read.get(parent)?;
            if status.is_invalid() {
                return Err(ConsensusError::Rule(RuleError::KnownInvalidParent(parent)));
            }
            if require_parent_bodies && !status.has_block_body() {
                missing.push(parent);
            }
        }
        if !missing.is_empty() {
            return Err(ConsensusError::MissingParents(missing));
        }
        Ok(())
    }

    pub fn check_pow(&self, header: &Header) -> BlockProcessResult<()> {
        if !difficulty::check_pow(header.hash, header.bits) {
            return Err(RuleError::InvalidPoW);
        }
        Ok(())
    }

    /// GHOSTDAG computation plus all contextual header rules. Serialized by
    /// the acceptance lock.
    pub fn validate_header_in_context(&self, header: &Header) -> ConsensusResult<Arc<GhostdagData>> {
        let ghostdag_data = Arc::new(self.ghostdag_manager.ghostdag(header.direct_parents())?);

        // The block must be in the future of the pruning point
        let pruning_point = self.storage.pruning_store.read().pruning_point()?;
        if !self
            .reachability_service
            .is_dag_ancestor_of_any(pruning_point, &mut header.direct_parents().iter().copied())?
        {
            return Err(ConsensusError::Rule(RuleError::PruningViolation(pruning_point)));
        }

        // Declared ordering data is self-reported and re-verified
        if header.blue_score != ghostdag_data.blue_score {
            return Err(ConsensusError::Rule(RuleError::UnexpectedBlueScore {
                got: header.blue_score,
                expected: ghostdag_data.blue_score,
            }));
        }
        if header.blue_work != ghostdag_data.blue_work {
            return Err(ConsensusError::Rule(RuleError::UnexpectedBlueWork {
                got: header.blue_work,
                expected: ghostdag_data.blue_work,
            }));
        }

        let mergeset_size = ghostdag_data.mergeset_size() as u64;
        if mergeset_size > self.mergeset_size_limit {
            return Err(ConsensusError::Rule(RuleError::MergeSetTooBig(mergeset_size, self.mergeset_size_limit)));
        }

        // Bounded merge depth: no merged block may be too deep below this one
        for merged in ghostdag_data.unordered_mergeset_without_selected_parent() {
            let merged_blue_score = self.storage.ghostdag_store.get_blue_score(merged)?;
            let depth = ghostdag_data.blue_score.saturating_sub(merged_blue_score);
            if depth > self.merge_depth_bound {
                return Err(ConsensusError::Rule(RuleError::ViolatingBoundedMergeDepth(merged, depth, self.merge_depth_bound)));
            }
        }

        // Difficulty and past median time from the blue windows
        let difficulty_window = self.window_manager.blue_window(&ghostdag_data, self.difficulty_window_size)?;
        let expected_bits = self.difficulty_manager.expected_difficulty_bits(&difficulty_window)?;
        if header.bits != expected_bits {
            return Err(ConsensusError::Rule(RuleError::UnexpectedDifficulty { got: header.bits, expected: expected_bits }));
        }

        let median_window = self.window_manager.blue_window(&ghostdag_data, self.past_median_time_window_size)?;
        let past_median_time = self.past_median_time_manager.calc_past_median_time(&median_window)?;
        if header.timestamp <= past_median_time {
            return Err(ConsensusError::Rule(RuleError::TimeTooOld(header.timestamp, past_median_time)));
        }

        // Declared pruning point must be one this node moved through
        let pruning_info = self.storage.pruning_store.read().get()?;
        if !self.pruning_manager.is_valid_header_pruning_point(
            header.pruning_point,
            &pruning_info,
            self.storage.past_pruning_points_store.as_ref(),
        )? {
            return Err(ConsensusError::Rule(RuleError::WrongHeaderPruningPoint(header.pruning_point)));
        }

        Ok(ghostdag_data)
    }

    /// Persists all header data in one batch: header, relations, GHOSTDAG
    /// data, reachability insertion (with any induced reindex) and the
    /// `HeaderOnly` status. The returned reachability write guard must be
    /// held until the batch is committed.
    pub fn commit_header<'a>(
        &'a self,
        batch: &mut WriteBatch,
        header: &Arc<Header>,
        ghostdag_data: &Arc<GhostdagData>,
    ) -> ConsensusResult<parking_lot::RwLockWriteGuard<'a, crate::model::stores::reachability::DbReachabilityStore>> {
        let hash = header.hash;

        self.storage.headers_store.insert_batch(batch, Arc::clone(header))?;
        self.storage.relations_store.insert_batch(batch, hash, BlockHashes::new(header.parents.clone()))?;
        self.storage.ghostdag_store.insert_batch(batch, hash, Arc::clone(ghostdag_data))?;
        self.storage.statuses_store.write().set_batch(batch, hash, BlockStatus::HeaderOnly)?;

        let mut staging = StagingReachabilityStore::new(self.storage.reachability_store.upgradable_read());
        let mergeset: Vec<Hash> = ghostdag_data.unordered_mergeset_without_selected_parent().collect();
        reachability::add_block(&mut staging, hash, ghostdag_data.selected_parent, &mergeset)?;
        let reachability_write = staging.commit(batch)?;

        Ok(reachability_write)
    }
}

pub fn unix_now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_millis() as u64).unwrap_or_default()
}
