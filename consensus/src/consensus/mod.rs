pub mod storage;
pub mod test_consensus;

use crate::errors::{ConsensusError, ConsensusResult, RuleError};
use crate::model::services::reachability::{MTReachabilityService, ReachabilityService};
use crate::model::stores::block_transactions::{BlockTransactionsStore, BlockTransactionsStoreReader};
use crate::model::stores::ghostdag::GhostdagStore;
use crate::model::stores::headers::{HeaderStore, HeaderStoreReader};
use crate::model::stores::pruning::{PruningPointInfo, PruningStore, PruningStoreReader};
use crate::model::stores::reachability::StagingReachabilityStore;
use crate::model::stores::relations::RelationsStore;
use crate::model::stores::statuses::{StatusesStore, StatusesStoreReader};
use crate::model::stores::tips::TipsStoreReader;
use crate::model::stores::utxo_set::UtxoSetStoreReader;
use crate::model::stores::virtual_state::{VirtualState, VirtualStateStoreReader};
use crate::params::Params;
use crate::pipeline::body_processor::BodyProcessor;
use crate::pipeline::header_processor::HeaderProcessor;
use crate::pipeline::pruning_processor::PruningProcessor;
use crate::pipeline::virtual_processor::VirtualStateProcessor;
use crate::pipeline::{DbGhostdagManager, DbReachabilityService};
use crate::processes::difficulty::DifficultyManager;
use crate::processes::finality::FinalityManager;
use crate::processes::ghostdag::protocol::GhostdagManager;
use crate::processes::pruning::PruningManager;
use crate::processes::past_median_time::PastMedianTimeManager;
use crate::processes::reachability::inquirer as reachability;
use crate::processes::transaction_validator::TransactionValidator;
use crate::processes::window::WindowManager;
use arc_swap::ArcSwap;
use braid_consensus_core::block::Block;
use braid_consensus_core::blockhash::ORIGIN;
use braid_consensus_core::blockstatus::BlockStatus;
use braid_consensus_core::events::ConsensusEvent;
use braid_consensus_core::header::Header;
use braid_consensus_core::tx::{Transaction, TransactionOutpoint, UtxoEntry};
use braid_consensus_core::utxo::commitment::UtxoCommitment;
use braid_database::prelude::DB;
use braid_hashes::Hash;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use rocksdb::WriteBatch;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use storage::ConsensusStorage;

/// The consensus engine facade. Validation work runs without locks and may
/// be invoked from many threads; acceptance into the DAG (ordering data,
/// virtual state, pruning) is serialized behind a single write lock. Readers
/// are served from the last committed snapshot and never block the writer.
pub struct Consensus {
    params: Params,
    genesis_hash: Hash,

    pub(crate) storage: Arc<ConsensusStorage>,
    pub(crate) header_processor: HeaderProcessor,
    pub(crate) body_processor: BodyProcessor,
    pub(crate) virtual_processor: VirtualStateProcessor,
    pub(crate) pruning_processor: PruningProcessor,
    pub(crate) reachability_service: DbReachabilityService,
    pub(crate) ghostdag_manager: DbGhostdagManager,

    virtual_snapshot: ArcSwap<VirtualState>,
    write_lock: Mutex<()>,
    poisoned: AtomicBool,
    listeners: RwLock<Vec<Sender<ConsensusEvent>>>,
}

impl Consensus {
    pub fn new(db: Arc<DB>, params: Params) -> ConsensusResult<Arc<Self>> {
        let genesis_block = params.build_genesis();
        let genesis_hash = genesis_block.hash();
        let storage = ConsensusStorage::new(db);

        let reachability_service = MTReachabilityService::new(Arc::clone(&storage.reachability_store));
        let ghostdag_manager = GhostdagManager::new(
            genesis_hash,
            params.ghostdag_k,
            Arc::clone(&storage.ghostdag_store),
            Arc::clone(&storage.relations_store),
            Arc::clone(&storage.headers_store),
            reachability_service.clone(),
        );
        let window_manager = WindowManager::new(Arc::clone(&storage.ghostdag_store));
        let difficulty_manager = DifficultyManager::new(
            Arc::clone(&storage.headers_store),
            params.genesis.bits,
            params.min_difficulty_window_size,
            params.target_time_per_block_ms,
        );
        let past_median_time_manager = PastMedianTimeManager::new(Arc::clone(&storage.headers_store), params.genesis.timestamp);
        let pruning_manager = PruningManager::new(
            params.pruning_depth,
            params.finality_depth,
            genesis_hash,
            Arc::clone(&storage.ghostdag_store),
            reachability_service.clone(),
        );
        let finality_manager = FinalityManager::new(params.finality_depth, genesis_hash, Arc::clone(&storage.ghostdag_store));
        let transaction_validator = TransactionValidator::new(params.coinbase_maturity);

        let header_processor = HeaderProcessor::new(
            &params,
            Arc::clone(&storage),
            ghostdag_manager.clone(),
            window_manager.clone(),
            difficulty_manager.clone(),
            past_median_time_manager.clone(),
            pruning_manager.clone(),
            reachability_service.clone(),
        );
        let body_processor = BodyProcessor::new(params.max_block_mass, transaction_validator.clone(), Arc::clone(&storage));
        let virtual_processor = VirtualStateProcessor::new(
            &params,
            Arc::clone(&storage),
            ghostdag_manager.clone(),
            window_manager,
            difficulty_manager,
            past_median_time_manager,
            finality_manager,
            reachability_service.clone(),
            transaction_validator,
        );
        let pruning_processor = PruningProcessor::new(Arc::clone(&storage), pruning_manager, reachability_service.clone());

        if !storage.virtual_state_store.is_initialized() {
            bootstrap_genesis(&storage, &virtual_processor, &genesis_block)?;
        }
        let initial_state = storage.virtual_state_store.get()?;

        Ok(Arc::new(Self {
            params,
            genesis_hash,
            storage,
            header_processor,
            body_processor,
            virtual_processor,
            pruning_processor,
            reachability_service,
            ghostdag_manager,
            virtual_snapshot: ArcSwap::new(initial_state),
            write_lock: Mutex::new(()),
            poisoned: AtomicBool::new(false),
            listeners: RwLock::new(Vec::new()),
        }))
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis_hash
    }

    /// Registers an event listener; each listener receives every consensus
    /// event from this point on
    pub fn register_listener(&self) -> Receiver<ConsensusEvent> {
        let (sender, receiver) = unbounded();
        self.listeners.write().push(sender);
        receiver
    }

    fn notify(&self, events: Vec<ConsensusEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read();
        for event in events {
            for listener in listeners.iter() {
                // Disconnected listeners are dropped lazily on the next sweep
                let _ = listener.send(event.clone());
            }
        }
    }

    fn check_poisoned(&self) -> ConsensusResult<()> {
        if self.poisoned.load(Ordering::Acquire) {
            return Err(ConsensusError::Poisoned);
        }
        Ok(())
    }

    /// Marks the engine write-poisoned after an invariant violation or a
    /// storage failure on the write path (store caches may be ahead of disk
    /// at that point); reads stay available for diagnostics
    fn poison_write_path(&self, result: ConsensusError) -> ConsensusError {
        if matches!(result, ConsensusError::InvariantViolation(_) | ConsensusError::Store(_)) {
            log::error!("halting consensus writes: {}", result);
            self.poisoned.store(true, Ordering::Release);
        }
        result
    }

    /// Submits a block (header + body) for validation and acceptance.
    /// Heavy validation runs before the acceptance lock is taken; only the
    /// ordering-dependent steps are serialized.
    pub fn submit_block(&self, block: Block) -> ConsensusResult<BlockStatus> {
        self.check_poisoned()?;
        let hash = block.hash();
        let header = Arc::new(block.header.clone());

        match self.storage.statuses_store.read().get(hash) {
            Ok(status) if status.has_block_body() || status.is_invalid() => return Err(ConsensusError::DuplicateBlock(hash)),
            Ok(_) | Err(_) => {}
        }

        // Stateless validation, parallel-friendly, lock-free
        self.header_processor.validate_header_in_isolation(&header)?;
        self.header_processor.check_parents(&header, true).map_err(|err| self.record_rule_failure(hash, err))?;
        self.check_rule(hash, self.header_processor.check_pow(&header))?;
        self.check_rule(hash, self.body_processor.validate_body_in_isolation(&block))?;

        // Acceptance critical section
        let _write_guard = self.write_lock.lock();
        self.check_poisoned()?;
        if self.storage.statuses_store.read().get(hash).map(|s| s.has_block_body()).unwrap_or(false) {
            return Err(ConsensusError::DuplicateBlock(hash));
        }

        let already_has_header = self.storage.statuses_store.read().has(hash)?;

        // Stage 1: header + body acceptance, one atomic batch
        let mut batch = WriteBatch::default();
        let reachability_guard = if already_has_header {
            None
        } else {
            let ghostdag_data = match self.header_processor.validate_header_in_context(&header) {
                Ok(data) => data,
                Err(err) => return Err(self.record_rule_failure(hash, err)),
            };
            Some(self.header_processor.commit_header(&mut batch, &header, &ghostdag_data)?)
        };
        self.body_processor.commit_body(&mut batch, &block)?;
        self.commit_batch(batch)?;
        drop(reachability_guard);

        // Stage 2: virtual state transition, one atomic batch
        let mut batch = WriteBatch::default();
        let outcome = self.virtual_processor.resolve_virtual(hash, &mut batch).map_err(|err| self.poison_write_path(err))?;
        self.commit_batch(batch)?;
        self.virtual_snapshot.store(Arc::clone(&outcome.new_state));

        let mut events = vec![ConsensusEvent::BlockAccepted(hash)];
        events.extend(outcome.events);

        // Stage 3: pruning advancement, one atomic batch
        let mut batch = WriteBatch::default();
        let pruning_events = self
            .pruning_processor
            .advance_pruning_point(outcome.new_state.ghostdag_data.to_compact(), &mut batch)
            .map_err(|err| self.poison_write_path(err))?;
        self.commit_batch(batch)?;
        events.extend(pruning_events);

        self.notify(events);

        if let Some(rule_error) = outcome.submitted_block_rule_error {
            return Err(ConsensusError::Rule(rule_error));
        }
        Ok(self.storage.statuses_store.read().get(hash)?)
    }

    /// Submits a bare header (header-first sync). The block is indexed and
    /// ordered but takes no part in the virtual until its body arrives.
    pub fn submit_header(&self, header: Header) -> ConsensusResult<BlockStatus> {
        self.check_poisoned()?;
        let hash = header.hash;
        let header = Arc::new(header);

        if self.storage.statuses_store.read().has(hash)? {
            return Err(ConsensusError::DuplicateBlock(hash));
        }

        self.header_processor.validate_header_in_isolation(&header)?;
        self.header_processor.check_parents(&header, false).map_err(|err| self.record_rule_failure(hash, err))?;
        self.check_rule(hash, self.header_processor.check_pow(&header))?;

        let _write_guard = self.write_lock.lock();
        self.check_poisoned()?;
        if self.storage.statuses_store.read().has(hash)? {
            return Err(ConsensusError::DuplicateBlock(hash));
        }

        let mut batch = WriteBatch::default();
        let ghostdag_data = match self.header_processor.validate_header_in_context(&header) {
            Ok(data) => data,
            Err(err) => return Err(self.record_rule_failure(hash, err)),
        };
        let reachability_guard = self.header_processor.commit_header(&mut batch, &header, &ghostdag_data)?;
        self.commit_batch(batch)?;
        drop(reachability_guard);

        Ok(BlockStatus::HeaderOnly)
    }

    /// Persists an `Invalid` status for rule violations (never for deferrals
    /// or storage failures) and passes the error through
    fn check_rule(&self, hash: Hash, result: crate::errors::BlockProcessResult<()>) -> ConsensusResult<()> {
        match result {
            Ok(()) => Ok(()),
            Err(rule_error) => Err(self.record_rule_failure(hash, ConsensusError::Rule(rule_error))),
        }
    }

    fn record_rule_failure(&self, hash: Hash, err: ConsensusError) -> ConsensusError {
        if let ConsensusError::Rule(_) = err {
            if let Err(store_err) = self.storage.statuses_store.write().set(hash, BlockStatus::Invalid) {
                return ConsensusError::Store(store_err);
            }
        }
        err
    }

    fn commit_batch(&self, batch: WriteBatch) -> ConsensusResult<()> {
        self.storage.db.write(batch).map_err(|err| {
            // Caches may now be ahead of disk; halt writes and surface the
            // failure for operator-level handling
            self.poisoned.store(true, Ordering::Release);
            log::error!("storage failure during consensus commit: {}", err);
            ConsensusError::Store(err.into())
        })
    }

    // ------------------------------------------------------------------
    // Read API (lock-free with respect to the acceptance writer)
    // ------------------------------------------------------------------

    pub fn get_block(&self, hash: Hash) -> ConsensusResult<(Arc<Header>, Option<Arc<Vec<Transaction>>>, BlockStatus)> {
        let status = self.storage.statuses_store.read().get(hash).map_err(|_| ConsensusError::BlockNotFound(hash))?;
        let header = self.storage.headers_store.get_header(hash)?;
        let transactions = if self.storage.block_transactions_store.has(hash)? {
            Some(self.storage.block_transactions_store.get(hash)?)
        } else {
            None
        };
        Ok((header, transactions, status))
    }

    pub fn get_block_status(&self, hash: Hash) -> Option<BlockStatus> {
        self.storage.statuses_store.read().get(hash).ok()
    }

    pub fn tips(&self) -> ConsensusResult<Vec<Hash>> {
        Ok(self.storage.tips_store.read().get()?.iter().copied().collect())
    }

    /// The last committed virtual state snapshot
    pub fn virtual_state_snapshot(&self) -> Arc<VirtualState> {
        self.virtual_snapshot.load_full()
    }

    pub fn virtual_parents(&self) -> Vec<Hash> {
        self.virtual_snapshot.load().parents.clone()
    }

    pub fn virtual_selected_parent(&self) -> Hash {
        self.virtual_snapshot.load().selected_parent()
    }

    /// Looks up a UTXO entry in the materialized virtual UTXO set
    pub fn get_virtual_utxo_entry(&self, outpoint: &TransactionOutpoint) -> Option<UtxoEntry> {
        self.storage.virtual_utxo_store.get(outpoint).ok()
    }

    /// A full copy of the virtual UTXO set. Intended for indexers and tests;
    /// size grows with the live set.
    pub fn virtual_utxo_set_snapshot(&self) -> ConsensusResult<braid_consensus_core::utxo::utxo_collection::UtxoCollection> {
        Ok(self.storage.virtual_utxo_store.iterate_all()?)
    }

    pub fn is_dag_ancestor_of(&self, anchor: Hash, queried: Hash) -> ConsensusResult<bool> {
        Ok(self.reachability_service.is_dag_ancestor_of(anchor, queried)?)
    }

    pub fn is_chain_ancestor_of(&self, anchor: Hash, queried: Hash) -> ConsensusResult<bool> {
        Ok(self.reachability_service.is_chain_ancestor_of(anchor, queried)?)
    }

    pub fn pruning_point(&self) -> ConsensusResult<Hash> {
        Ok(self.storage.pruning_store.read().pruning_point()?)
    }

    pub fn pruning_info(&self) -> ConsensusResult<PruningPointInfo> {
        Ok(self.storage.pruning_store.read().get()?)
    }

    pub fn finality_point(&self) -> ConsensusResult<Hash> {
        self.virtual_processor.finality_point()
    }

    /// The selected chain from the pruning point (first element) up to the
    /// virtual's selected parent (last element), in chain order
    pub fn selected_chain_from_pruning_point(&self) -> ConsensusResult<Vec<Hash>> {
        let pruning_point = self.pruning_point()?;
        let sink = self.virtual_selected_parent();
        let mut chain = vec![pruning_point];
        chain.extend(self.reachability_service.forward_chain_path(pruning_point, sink)?);
        Ok(chain)
    }
}

/// Seeds a fresh database with the genesis block and the initial virtual,
/// reachability, tips and pruning state, committed as one batch
fn bootstrap_genesis(
    storage: &Arc<ConsensusStorage>,
    virtual_processor: &VirtualStateProcessor,
    genesis_block: &Block,
) -> ConsensusResult<()> {
    let genesis_hash = genesis_block.hash();
    log::info!("bootstrapping consensus at genesis {}", genesis_hash);

    let mut batch = WriteBatch::default();
    let header = Arc::new(genesis_block.header.clone());
    storage.headers_store.insert_batch(&mut batch, Arc::clone(&header))?;
    storage.relations_store.insert_batch(&mut batch, genesis_hash, braid_consensus_core::BlockHashes::new(vec![]))?;
    storage.block_transactions_store.insert_batch(&mut batch, genesis_hash, Arc::new((*genesis_block.transactions).clone()))?;
    storage.statuses_store.write().set_batch(&mut batch, genesis_hash, BlockStatus::UtxoValid)?;
    storage.tips_store.write().init_batch(&mut batch, &[genesis_hash])?;

    {
        let mut staging = StagingReachabilityStore::new(storage.reachability_store.upgradable_read());
        reachability::init(&mut staging, ORIGIN)?;
        reachability::add_block(&mut staging, genesis_hash, ORIGIN, &[])?;
        let reachability_guard = staging.commit(&mut batch)?;
        drop(reachability_guard);
    }

    let genesis_ghostdag_data = Arc::new(crate::model::stores::ghostdag::GhostdagData::genesis());
    storage.ghostdag_store.insert_batch(&mut batch, genesis_hash, genesis_ghostdag_data)?;

    let pruning_info = PruningPointInfo::from_genesis(genesis_hash, UtxoCommitment::EMPTY);
    storage.pruning_store.read().set_batch(&mut batch, pruning_info)?;
    storage.past_pruning_points_store.insert_batch(&mut batch, 0, genesis_hash)?;

    virtual_processor.init_virtual_state(&mut batch, genesis_hash)?;

    storage.db.write(batch).map_err(|err| ConsensusError::Store(err.into()))?;
    Ok(())
}
